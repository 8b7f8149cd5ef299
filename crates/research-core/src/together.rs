//! Together AI client (streaming chat completions)

use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::TogetherConfig;
use crate::error::LlmError;
use crate::messages::ChatMessage;

/// Open-weight models served through Together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TogetherModel {
    Llama,
    Mistral,
}

impl TogetherModel {
    pub fn name(&self) -> &'static str {
        match self {
            TogetherModel::Llama => "llama",
            TogetherModel::Mistral => "mistral",
        }
    }
}

#[derive(Debug, Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    max_tokens: u32,
    stop: [&'static str; 1],
}

#[derive(Debug, Clone)]
pub struct TogetherClient {
    http: Client,
    endpoint: String,
    llama_model: String,
    mistral_model: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl TogetherClient {
    pub fn new(http: Client, config: &TogetherConfig, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoint: config.endpoint.clone(),
            llama_model: config.llama_model.clone(),
            mistral_model: config.mistral_model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
        }
    }

    fn model_id(&self, model: TogetherModel) -> &str {
        match model {
            TogetherModel::Llama => &self.llama_model,
            TogetherModel::Mistral => &self.mistral_model,
        }
    }

    /// Stream a completion and return the concatenated answer.
    ///
    /// A non-success status is not an error: the caller gets the
    /// `Failed to get response from <model>` text instead.
    pub async fn complete(&self, prompt: &str, model: TogetherModel) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey(self.api_key_env.clone()))?;

        let request = StreamRequest {
            model: self.model_id(model),
            messages: vec![
                ChatMessage::system("You are a helpful assistant."),
                ChatMessage::user(prompt),
            ],
            stream: true,
            max_tokens: 1024,
            stop: ["</s>"],
        };

        debug!(model = request.model, "Streaming from Together");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), model = model.name(), "Together request failed");
            return Ok(format!("Failed to get response from {}", model.name()));
        }

        let mut accumulator = SseAccumulator::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            accumulator.push(&chunk);
            if accumulator.is_done() {
                break;
            }
        }

        Ok(accumulator.finish())
    }
}

/// Incremental parser for `data:` server-sent event lines.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    pending: Vec<u8>,
    answer: String,
    done: bool,
}

impl SseAccumulator {
    /// Feed raw bytes from the stream; chunks may split lines anywhere.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.done {
            return;
        }
        self.pending.extend_from_slice(chunk);

        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            self.handle_line(line.trim_end_matches(['\r', '\n']));
            if self.done {
                self.pending.clear();
                return;
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Flush any trailing line and return the trimmed answer
    pub fn finish(mut self) -> String {
        if !self.done && !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw).into_owned();
            self.handle_line(line.trim_end());
        }
        self.answer.trim().to_string()
    }

    fn handle_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        if line.trim() == "data: [DONE]" {
            self.done = true;
            return;
        }
        if !line.starts_with("data:") || line.len() <= 6 {
            return;
        }

        match serde_json::from_str::<Value>(&line[5..]) {
            Ok(event) => {
                let choice = event.get("choices").and_then(|c| c.get(0));
                let text = choice
                    .and_then(|c| c.get("text"))
                    .and_then(Value::as_str)
                    .or_else(|| {
                        choice
                            .and_then(|c| c.get("delta"))
                            .and_then(|d| d.get("content"))
                            .and_then(Value::as_str)
                    })
                    .unwrap_or("");
                self.answer.push_str(text);
            }
            Err(e) => {
                debug!(error = %e, "Skipping undecodable stream line");
            }
        }
    }
}
