mod app;
mod clipboard;
mod config;
mod error;
mod events;
mod llm;
mod postprocess;
mod prompts;
mod render;
mod session;
mod ui;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::Config;
use crate::llm::LlmClient;
use crate::session::SessionController;

#[derive(Parser)]
#[command(name = "bit")]
#[command(version)]
#[command(about = "Chat with an LLM from your terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file to use instead of ~/.bit/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Model identifier for this run
    #[arg(long, global = true, value_name = "ID")]
    model: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the reply
    Ask {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file if it does not exist yet
        #[arg(long)]
        init: bool,
    },
}

fn log_filter(verbose: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Log to `~/.bit/logs/bit.log` so output never lands on the TUI screen
fn init_file_logging(verbose: u8) -> Result<WorkerGuard> {
    let log_dir = Config::home_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::never(&log_dir, "bit.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn init_stderr_logging(verbose: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_tui(config: Config) -> Result<()> {
    let client = LlmClient::new(config.clone())?;
    let mut app = App::new(&config, Arc::new(client));
    app.run().await
}

async fn ask(config: Config, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        bail!("Nothing to ask");
    }
    if !config.has_api_key() {
        bail!(
            "No API key found. Set {} or add api_key to the config file.",
            config.api_key_env
        );
    }

    let client = LlmClient::new(config)?;
    let mut controller = SessionController::new(Arc::new(client));
    let Some(reply) = controller.submit_and_wait(text).await else {
        bail!("No reply was produced");
    };

    for line in render::render(reply).plain_lines() {
        println!("{line}");
    }
    Ok(())
}

fn show_config(path: &Path, config: &Config, init: bool) -> Result<()> {
    if init {
        if path.exists() {
            println!("⚠️  {} already exists, leaving it untouched", path.display());
        } else {
            config.save(path)?;
            println!("✅ Wrote {}", path.display());
        }
    }

    let status = if path.exists() { "" } else { " (not found, using defaults)" };
    println!("📁 Config file: {}{status}", path.display());
    let key_status = if config.has_api_key() { "set" } else { "missing" };
    println!("🔑 API key: {key_status} (env {})", config.api_key_env);
    println!();
    print!("{}", config.redacted_toml()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load(&config_path)?;
    if let Some(model) = cli.model {
        config.model = model;
    }

    match cli.command {
        None => {
            let _guard = init_file_logging(cli.verbose)?;
            info!(model = %config.model, "starting bit");
            run_tui(config).await
        }
        Some(Commands::Ask { text }) => {
            init_stderr_logging(cli.verbose);
            ask(config, &text.join(" ")).await
        }
        Some(Commands::Config { init }) => show_config(&config_path, &config, init),
    }
}
