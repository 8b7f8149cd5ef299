//! OpenAI chat completions client

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::error::LlmError;
use crate::messages::ChatMessage;

/// Shape the model is asked to answer in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonObject,
}

impl ResponseFormat {
    /// What a caller gets back when every attempt failed
    pub fn empty_response(self) -> &'static str {
        match self {
            ResponseFormat::Text => "",
            ResponseFormat::JsonObject => "{}",
        }
    }
}

#[derive(Debug, Serialize)]
struct FormatSpec {
    #[serde(rename = "type")]
    format_type: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    response_format: FormatSpec,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

/// Raw HTTP client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
    api_key_env: String,
}

impl OpenAiClient {
    pub fn new(http: Client, config: &OpenAiConfig, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
            api_key_env: config.api_key_env.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One attempt at a chat completion.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        format: ResponseFormat,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey(self.api_key_env.clone()))?;

        let request = ChatRequest {
            model: &self.model,
            response_format: FormatSpec {
                format_type: format,
            },
            messages,
            temperature,
            max_tokens: self.max_tokens,
            top_p: 0.5,
            frequency_penalty: 0.5,
            presence_penalty: 0.5,
        };

        debug!(model = %self.model, messages = messages.len(), ?format, "Calling chat completions");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {e}")))?;

        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(LlmError::Model(message));
        }

        if status >= 400 {
            return Err(LlmError::ApiError {
                status,
                message: body.to_string(),
            });
        }

        extract_content(&body)
    }
}

fn extract_content(body: &Value) -> Result<String, LlmError> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LlmError::InvalidResponse(format!("unexpected response shape: {body}")))
}
