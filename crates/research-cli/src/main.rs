//! autoresearch: an autonomous research agent
//!
//! The agent plans a research task, writes and runs Python for each step,
//! reflects on the results and finishes with a written report.

mod agent;
mod commands;
mod executor;
mod files;
mod host;
mod input;
mod progress;
mod report;
mod research;
mod session;
mod template;
mod trace;

use std::path::PathBuf;

use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "autoresearch")]
#[command(about = "Autonomous research agent: plan, act in Python, reflect", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(
        short,
        long,
        global = true,
        env = "AUTORESEARCH_VERBOSE",
        value_parser = FalseyValueParser::new()
    )]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the research agent (interactive when no task is given)
    Run {
        /// Research task to perform
        task: Vec<String>,

        /// Pause for confirmation before every iteration
        #[arg(long, env = "AUTORESEARCH_STEP", value_parser = FalseyValueParser::new())]
        step: bool,

        /// Path to research.toml (default: search current directory and parents)
        #[arg(long = "model-config", alias = "config", env = "AUTORESEARCH_CONFIG")]
        model_config: Option<PathBuf>,
    },

    /// One-shot query to a model
    Ask {
        /// The prompt to send
        prompt: Vec<String>,

        /// Model to use: gpt4, olmo, llama or mistral
        #[arg(short, long, default_value = "gpt4")]
        model: String,

        /// Request a JSON object and pretty-print it (gpt4 only)
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Write a default research.toml
    Init {
        /// Output path (default: ./research.toml)
        path: Option<PathBuf>,
    },
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if cli.verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new("warn"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Some(Commands::Run {
            task,
            step,
            model_config,
        }) => commands::run(task, step, model_config).await,
        Some(Commands::Ask {
            prompt,
            model,
            json,
        }) => {
            let prompt_text = prompt.join(" ");
            commands::ask(&prompt_text, &model, json).await
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { path } => commands::config_init(path).await,
            ConfigAction::Show => commands::config_show().await,
        },
        None => {
            // Default to an interactive research session
            commands::run(Vec::new(), false, None).await
        }
    }
}
