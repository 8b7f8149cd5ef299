//! OLMo inference client (line-delimited JSON responses)

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::OlmoConfig;
use crate::error::LlmError;
use crate::messages::ChatMessage;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model_version_id: &'a str,
    input: CompletionInput,
}

#[derive(Debug, Serialize)]
struct CompletionInput {
    messages: Vec<ChatMessage>,
    opts: CompletionOpts,
}

#[derive(Debug, Serialize)]
struct CompletionOpts {
    temperature: f32,
    max_tokens: u32,
    logprobs: u32,
}

#[derive(Debug, Clone)]
pub struct OlmoClient {
    http: Client,
    endpoint: String,
    model_version_id: String,
    token: Option<String>,
    token_env: String,
}

impl OlmoClient {
    pub fn new(http: Client, config: &OlmoConfig, token: Option<String>) -> Self {
        Self {
            http,
            endpoint: config.endpoint.clone(),
            model_version_id: config.model_version_id.clone(),
            token,
            token_env: config.api_key_env.clone(),
        }
    }

    pub async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey(self.token_env.clone()))?;

        let request = CompletionRequest {
            model_version_id: &self.model_version_id,
            input: CompletionInput {
                messages: vec![ChatMessage::user(prompt)],
                opts: CompletionOpts {
                    temperature,
                    max_tokens: 1000,
                    logprobs: 2,
                },
            },
        };

        debug!(endpoint = %self.endpoint, "Calling OLMo");

        let body = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?
            .text()
            .await?;

        collect_tokens(&body)
    }
}

/// Join the `result.output.text` token of every response line.
pub fn collect_tokens(body: &str) -> Result<String, LlmError> {
    body.trim()
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let event: Value = serde_json::from_str(line)
                .map_err(|e| LlmError::InvalidResponse(format!("bad OLMo line {line:?}: {e}")))?;
            Ok(event
                .pointer("/result/output/text")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_collect_tokens() {
        let body = concat!(
            "{\"result\":{\"output\":{\"text\":\"The capital\"}}}\n",
            "{\"result\":{\"output\":{\"text\":\" of England\"}}}\n",
            "{\"result\":{}}\n",
            "{\"result\":{\"output\":{\"text\":\" is London\"}}}\n",
        );
        assert_eq!(collect_tokens(body).unwrap(), "The capital of England is London");
    }

    #[test]
    fn test_collect_tokens_rejects_garbage() {
        assert!(matches!(
            collect_tokens("<html>502</html>"),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_against_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "model_version_id": "mov_test",
                "input": {"opts": {"max_tokens": 1000, "logprobs": 2}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"result\":{\"output\":{\"text\":\"2\"}}}\n",
            ))
            .mount(&server)
            .await;

        let config = OlmoConfig {
            endpoint: server.uri(),
            model_version_id: "mov_test".into(),
            ..OlmoConfig::default()
        };
        let client = OlmoClient::new(Client::new(), &config, Some("token".into()));
        assert_eq!(client.complete("What is 1 + 1?", 0.0).await.unwrap(), "2");
    }
}
