//! lorakit - console for LoRA fine-tuning against a local training backend
//!
//! Walks the operator through five stages (environment, data, settings,
//! training, evaluation & export). Each stage talks to the backend through
//! background jobs so the console stays responsive while they run.

mod commands;
mod render;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lorakit_core::ConsoleConfig;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// lorakit - LoRA fine-tuning console
#[derive(Parser, Debug)]
#[command(name = "lorakit", author, version, about = "Prepare data, fine-tune and evaluate LoRA adapters")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Backend base URL (overrides config and LORAKIT_BACKEND_URL)
    #[arg(short, long, global = true)]
    backend_url: Option<String>,

    /// Read configuration from this file instead of the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the interactive five-stage console (default)
    Console,

    /// Probe the backend environment and print it as JSON
    Env,

    /// Normalize dataset files offline and print canonical JSONL
    ///
    /// Warnings and per-file summaries go to stderr. Nothing is sent to the
    /// backend; a document is previewed as local summary prompts.
    Normalize {
        /// Dataset files (CSV/TSV, JSONL, conversations, markdown, plain text)
        files: Vec<PathBuf>,

        /// Free-text document to include
        #[arg(long)]
        document: Option<PathBuf>,
    },
}

fn load_config(args: &Args) -> anyhow::Result<ConsoleConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = ConsoleConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => ConsoleConfig::discover_and_load().context("Failed to load configuration")?,
    };

    // Command-line flags win over files and environment.
    if let Some(ref url) = args.backend_url {
        config.backend_url = Some(url.clone());
    }
    if let Some(ref level) = args.log_level {
        config.log_level = Some(level.clone());
    }
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let level = match config.log_level().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command.unwrap_or(Command::Console) {
        Command::Console => commands::console::execute(&config).await?,
        Command::Env => commands::env::execute(&config).await?,
        Command::Normalize { files, document } => commands::normalize::execute(&files, document.as_deref())?,
    }

    Ok(())
}
