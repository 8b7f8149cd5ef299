//! Configuration management for research.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "research.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub together: TogetherConfig,
    #[serde(default)]
    pub olmo: OlmoConfig,
    #[serde(default)]
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TogetherConfig {
    pub endpoint: String,
    pub llama_model: String,
    pub mistral_model: String,
    pub api_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OlmoConfig {
    pub endpoint: String,
    pub model_version_id: String,
    pub api_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Hard stop for runaway tasks
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Debug/retry attempts on one step before the agent replans
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Replaces the built-in system prompt
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,
    /// Interpreter used to run generated code
    #[serde(default = "default_python")]
    pub python: String,
}

fn default_max_iterations() -> usize {
    200
}

fn default_max_retries() -> usize {
    3
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_python() -> String {
    "python3".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4-1106-preview".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 4000,
        }
    }
}

impl Default for TogetherConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.together.xyz/v1/chat/completions".to_string(),
            llama_model: "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo".to_string(),
            mistral_model: "mistralai/Mixtral-8x7B-Instruct-v0.1".to_string(),
            api_key_env: "TOGETHER_API_KEY".to_string(),
        }
    }
}

impl Default for OlmoConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://ai2-reviz--olmoe-1b-7b-0924-instruct.modal.run/completion"
                .to_string(),
            model_version_id: "mov_01j1x1awwfqx23gmw0wkmb73ea".to_string(),
            api_key_env: "INFERD_TOKEN".to_string(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_retries: default_max_retries(),
            output_dir: default_output_dir(),
            system_prompt_file: None,
            python: default_python(),
        }
    }
}

impl Config {
    /// Load configuration from research.toml
    pub fn load() -> Result<Self> {
        Self::load_from(Self::find_config_path()?)
    }

    /// Try to load configuration, returning None if not found
    pub fn try_load() -> Option<Self> {
        Self::load().ok()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find research.toml by searching current directory and parents
    pub fn find_config_path() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;

        for _ in 0..10 {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        anyhow::bail!("{} not found in current directory or parents", CONFIG_FILE_NAME)
    }

    /// Write a commented default configuration file
    pub fn create_default(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }

        let default_config = r#"# autoresearch configuration

[openai]
endpoint = "https://api.openai.com/v1/chat/completions"
model = "gpt-4-1106-preview"
# Environment variable holding the API key
api_key_env = "OPENAI_API_KEY"
max_tokens = 4000

[together]
endpoint = "https://api.together.xyz/v1/chat/completions"
llama_model = "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo"
mistral_model = "mistralai/Mixtral-8x7B-Instruct-v0.1"
api_key_env = "TOGETHER_API_KEY"

[olmo]
endpoint = "https://ai2-reviz--olmoe-1b-7b-0924-instruct.modal.run/completion"
model_version_id = "mov_01j1x1awwfqx23gmw0wkmb73ea"
api_key_env = "INFERD_TOKEN"

[agent]
max_iterations = 200
max_retries = 3
output_dir = "output"
python = "python3"
# system_prompt_file = "agent_prompt.txt"
"#;

        std::fs::write(path, default_config)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Read an API key from the environment variable named in config
    pub fn api_key(env_name: &str) -> Option<String> {
        std::env::var(env_name).ok().filter(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[openai]
endpoint = "http://localhost:9000/v1/chat/completions"
model = "gpt-4o"
api_key_env = "MY_KEY"
max_tokens = 1000

[agent]
max_iterations = 20
output_dir = "/tmp/research"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.openai.model, "gpt-4o");
        assert_eq!(config.openai.max_tokens, 1000);
        assert_eq!(config.agent.max_iterations, 20);
        assert_eq!(config.agent.max_retries, 3);
        assert_eq!(config.agent.python, "python3");
        assert_eq!(config.together.api_key_env, "TOGETHER_API_KEY");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.agent.max_iterations, 200);
        assert_eq!(config.agent.output_dir, PathBuf::from("output"));
        assert!(config.agent.system_prompt_file.is_none());
    }

    #[test]
    fn test_partial_provider_tables() {
        let toml = r#"
[openai]
model = "gpt-4o-mini"

[together]
llama_model = "meta-llama/Llama-3-70b-chat-hf"

[olmo]
api_key_env = "OLMO_TOKEN"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        let defaults = Config::default();
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.openai.endpoint, defaults.openai.endpoint);
        assert_eq!(config.openai.max_tokens, defaults.openai.max_tokens);
        assert_eq!(config.together.llama_model, "meta-llama/Llama-3-70b-chat-hf");
        assert_eq!(config.together.mistral_model, defaults.together.mistral_model);
        assert_eq!(config.olmo.api_key_env, "OLMO_TOKEN");
        assert_eq!(config.olmo.endpoint, defaults.olmo.endpoint);
    }

    #[test]
    fn test_default_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        Config::create_default(&path).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.olmo.api_key_env, "INFERD_TOKEN");
        assert!(Config::create_default(&path).is_err());
    }
}
