//! Provider facade: dispatch, retries, memoisation and call counters

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::LlmError;
use crate::messages::to_messages;
use crate::olmo::OlmoClient;
use crate::openai::{OpenAiClient, ResponseFormat};
use crate::together::{TogetherClient, TogetherModel};

const MAX_ATTEMPTS: usize = 3;

/// Models reachable through [`LanguageModel::call_llm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelName {
    Gpt4,
    Olmo,
    Llama,
    Mistral,
}

impl FromStr for ModelName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpt4" => Ok(ModelName::Gpt4),
            "olmo" => Ok(ModelName::Olmo),
            "llama" => Ok(ModelName::Llama),
            "mistral" => Ok(ModelName::Mistral),
            other => Err(format!("Unrecognized model: {}", other)),
        }
    }
}

/// Number of calls made to each provider since the last reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounters {
    pub gpt: usize,
    pub olmo: usize,
    pub together: usize,
}

impl CallCounters {
    pub fn summary(&self) -> String {
        format!(
            "{} GPT calls, {} OLMo calls, {} Together calls.",
            self.gpt, self.olmo, self.together
        )
    }
}

/// A request to the main (GPT) model
#[derive(Debug, Clone)]
pub struct GptRequest {
    /// Flat dialog; see [`crate::to_messages`]
    pub prompts: Vec<String>,
    pub format: ResponseFormat,
    pub temperature: f32,
    /// Serve repeated identical requests from memory
    pub cache: bool,
    /// Prefix the single prompt with the running history, then extend it
    pub use_history: bool,
}

impl GptRequest {
    pub fn new(prompts: Vec<String>) -> Self {
        Self {
            prompts,
            format: ResponseFormat::Text,
            temperature: 0.0,
            cache: true,
            use_history: false,
        }
    }

    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![prompt.into()])
    }

    pub fn json(mut self) -> Self {
        self.format = ResponseFormat::JsonObject;
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_history(mut self, use_history: bool) -> Self {
        self.use_history = use_history;
        self
    }
}

/// The model surface the agent and research utilities depend on
#[async_trait]
pub trait LanguageModel: Send {
    /// Query the main model with a dialog
    async fn call_gpt4(&mut self, request: GptRequest) -> Result<String, LlmError>;

    /// Single-prompt query to any supported model.
    ///
    /// Unknown model names are answered with `Unrecognized model: <name>`
    /// rather than an error.
    async fn call_llm(&mut self, question: &str, model: &str) -> Result<String, LlmError>;

    fn counters(&self) -> CallCounters;

    /// Zero the counters and forget the running history
    fn reset(&mut self);
}

/// Provider facade used by the CLI
pub struct LlmClient {
    openai: OpenAiClient,
    together: TogetherClient,
    olmo: OlmoClient,
    counters: CallCounters,
    gpt_cache: HashMap<String, String>,
    olmo_cache: HashMap<String, String>,
    history: Vec<String>,
}

impl LlmClient {
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            openai: OpenAiClient::new(
                http.clone(),
                &config.openai,
                Config::api_key(&config.openai.api_key_env),
            ),
            together: TogetherClient::new(
                http.clone(),
                &config.together,
                Config::api_key(&config.together.api_key_env),
            ),
            olmo: OlmoClient::new(http, &config.olmo, Config::api_key(&config.olmo.api_key_env)),
            counters: CallCounters::default(),
            gpt_cache: HashMap::new(),
            olmo_cache: HashMap::new(),
            history: Vec::new(),
        })
    }

    /// Drop all memoised responses
    pub fn clear_cache(&mut self) {
        self.gpt_cache.clear();
        self.olmo_cache.clear();
    }

    /// Chat completion with up to three attempts.
    ///
    /// Exhausted retries are not an error: the empty response for the
    /// requested format is returned. A missing API key fails immediately.
    async fn raw_call_gpt4(
        &self,
        prompts: &[String],
        format: ResponseFormat,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let messages = to_messages(prompts);

        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.openai.complete(&messages, format, temperature).await {
                Ok(content) => return Ok(content),
                Err(e @ LlmError::MissingApiKey(_)) => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "GPT call failed");
                    println!("ERROR from GPT4: {}. Trying again...", e);
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            println!("ERROR from GPT4: {}. Giving up (returning NIL)", e);
        }
        Ok(format.empty_response().to_string())
    }

    async fn call_olmo(&mut self, prompt: &str, temperature: f32) -> Result<String, LlmError> {
        self.counters.olmo += 1;
        let key = cache_key(&[prompt], &format!("olmo:{temperature}"));
        if let Some(hit) = self.olmo_cache.get(&key) {
            debug!("OLMo cache hit");
            return Ok(hit.clone());
        }

        let answer = self.olmo.complete(prompt, temperature).await?;
        self.olmo_cache.insert(key, answer.clone());
        Ok(answer)
    }

    async fn call_together(&mut self, prompt: &str, model: TogetherModel) -> Result<String, LlmError> {
        self.counters.together += 1;
        self.together.complete(prompt, model).await
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn call_gpt4(&mut self, request: GptRequest) -> Result<String, LlmError> {
        let prompts = if request.use_history {
            if request.prompts.len() != 1 {
                return Err(LlmError::HistoryWithPromptList);
            }
            let mut prompts = self.history.clone();
            prompts.extend(request.prompts.iter().cloned());
            prompts
        } else {
            self.history.clear();
            request.prompts.clone()
        };

        let response = if request.cache {
            let key = cache_key(
                &prompts.iter().map(String::as_str).collect::<Vec<_>>(),
                &format!("{:?}:{}", request.format, request.temperature),
            );
            match self.gpt_cache.get(&key) {
                Some(hit) => {
                    debug!("GPT cache hit");
                    hit.clone()
                }
                None => {
                    let fresh = self
                        .raw_call_gpt4(&prompts, request.format, request.temperature)
                        .await?;
                    self.gpt_cache.insert(key, fresh.clone());
                    fresh
                }
            }
        } else {
            self.raw_call_gpt4(&prompts, request.format, request.temperature)
                .await?
        };

        if request.use_history {
            self.history.extend(request.prompts);
            self.history.push(response.clone());
        }
        self.counters.gpt += 1;
        info!(calls = self.counters.gpt, model = self.openai.model(), "GPT call complete");
        Ok(response)
    }

    async fn call_llm(&mut self, question: &str, model: &str) -> Result<String, LlmError> {
        match model.parse::<ModelName>() {
            Ok(ModelName::Gpt4) => self.call_gpt4(GptRequest::prompt(question)).await,
            Ok(ModelName::Olmo) => self.call_olmo(question, 0.0).await,
            Ok(ModelName::Llama) => self.call_together(question, TogetherModel::Llama).await,
            Ok(ModelName::Mistral) => self.call_together(question, TogetherModel::Mistral).await,
            Err(message) => Ok(message),
        }
    }

    fn counters(&self) -> CallCounters {
        self.counters
    }

    fn reset(&mut self) {
        self.counters = CallCounters::default();
        self.history.clear();
    }
}

fn cache_key(prompts: &[&str], discriminator: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(discriminator.as_bytes());
    for prompt in prompts {
        hasher.update((prompt.len() as u64).to_le_bytes());
        hasher.update(prompt.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
