//! Command implementations

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use research_core::config::CONFIG_FILE_NAME;
use research_core::{clean_extract_json, Config, GptRequest, LanguageModel, LlmClient, ModelName};
use tracing::{debug, info};

use crate::agent::{AgentConfig, ResearchAgent, DEFAULT_SYSTEM_PROMPT};
use crate::executor::PythonInterpreter;
use crate::host::Workbench;
use crate::input::TerminalInput;
use crate::session::ResearchSession;

// ANSI colors
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const BLUE: &str = "\x1b[94m";
const CYAN: &str = "\x1b[96m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Explicit path, else research.toml from the current directory or a
/// parent, else built-in defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::load_from(path);
    }
    match Config::find_config_path() {
        Ok(found) => {
            debug!(path = %found.display(), "Using config file");
            Config::load_from(found)
        }
        Err(_) => {
            debug!("No {} found, using defaults", CONFIG_FILE_NAME);
            Ok(Config::default())
        }
    }
}

fn system_prompt(config: &Config) -> Result<String> {
    match &config.agent.system_prompt_file {
        Some(file) => std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read system prompt {}", file.display())),
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

/// Run the research agent on one task, or interactively when no task is given
pub async fn run(task: Vec<String>, step: bool, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;

    let python = which::which(&config.agent.python).with_context(|| {
        format!(
            "Python interpreter '{}' not found (set agent.python in {})",
            config.agent.python, CONFIG_FILE_NAME
        )
    })?;
    debug!(python = %python.display(), "Found Python");

    let llm = LlmClient::new(&config)?;
    let session = ResearchSession::new(system_prompt(&config)?, config.agent.output_dir.clone());
    let workbench = Workbench::new(Box::new(llm), session);
    let interpreter = PythonInterpreter::new(config.agent.python.clone());
    let input = TerminalInput::new()?;

    let agent_config = AgentConfig::default()
        .with_max_iterations(config.agent.max_iterations)
        .with_max_retries(config.agent.max_retries)
        .with_auto_mode(!step);

    let task = (!task.is_empty()).then(|| task.join(" "));
    let interactive = task.is_none();
    info!(interactive, output_dir = %config.agent.output_dir.display(), "Starting research session");

    if interactive {
        println!("{}{}autoresearch{}", BOLD, CYAN, RESET);
        println!(
            "{}Reports and traces are written to {}{}",
            DIM,
            config.agent.output_dir.display(),
            RESET
        );
        println!();
    }

    let mut agent = ResearchAgent::new(workbench, Box::new(interpreter), Box::new(input), agent_config);
    agent.run(task, interactive).await
}

/// One-shot query
pub async fn ask(prompt: &str, model: &str, json_output: bool) -> Result<()> {
    let model_name: ModelName = model.parse().map_err(anyhow::Error::msg)?;
    if json_output && model_name != ModelName::Gpt4 {
        bail!("--json is only supported with the gpt4 model");
    }

    let config = load_config(None)?;
    let mut llm = LlmClient::new(&config)?;

    if json_output {
        let response = llm.call_gpt4(GptRequest::prompt(prompt).json()).await?;
        let value = clean_extract_json(&response).context("Model reply was not valid JSON")?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        let response = llm.call_llm(prompt, model).await?;
        println!("{}", response);
    }

    debug!(calls = %llm.counters().summary(), "Query complete");
    Ok(())
}

/// Write a default research.toml
pub async fn config_init(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => std::env::current_dir()?.join(CONFIG_FILE_NAME),
    };

    match Config::create_default(&path) {
        Ok(()) => {
            println!("{}Created:{} {}", GREEN, RESET, path.display());
            println!("\nSet the API key environment variables it names before running.");
        }
        Err(e) if e.to_string().contains("already exists") => {
            println!("Config file already exists: {}", path.display());
        }
        Err(e) => return Err(e),
    }

    Ok(())
}

/// Show the effective configuration
pub async fn config_show() -> Result<()> {
    let config = match Config::find_config_path() {
        Ok(path) => {
            println!("{}Configuration{}", BOLD, RESET);
            println!("  Path: {}", path.display());
            Config::load_from(&path)?
        }
        Err(_) => {
            println!("{}No {} found, using defaults{}", YELLOW, CONFIG_FILE_NAME, RESET);
            println!("Run 'autoresearch config init' to create one.");
            Config::default()
        }
    };
    println!();
    println!("{}", toml::to_string_pretty(&config)?);

    println!("{}[api keys]{}", BLUE, RESET);
    for env in [
        &config.openai.api_key_env,
        &config.together.api_key_env,
        &config.olmo.api_key_env,
    ] {
        let status = if Config::api_key(env).is_some() {
            format!("{}set{}", GREEN, RESET)
        } else {
            format!("{}not set{}", YELLOW, RESET)
        };
        println!("  {} = {}", env, status);
    }

    Ok(())
}
