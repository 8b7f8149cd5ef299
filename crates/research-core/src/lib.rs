//! research-core: Shared library for the research agent
//!
//! Provides:
//! - Configuration loading (research.toml)
//! - LLM provider clients (OpenAI chat, Together streaming, OLMo)
//! - Call counters and response memoisation
//! - Cleanup of model output (JSON keys, HTML, non-ASCII text)

pub mod client;
pub mod config;
pub mod error;
pub mod json;
pub mod messages;
pub mod olmo;
pub mod openai;
pub mod text;
pub mod together;

pub use client::{CallCounters, GptRequest, LanguageModel, LlmClient, ModelName};
pub use config::Config;
pub use error::LlmError;
pub use json::{clean_extract_json, clean_keys};
pub use messages::{to_messages, ChatMessage, Role};
pub use openai::ResponseFormat;
