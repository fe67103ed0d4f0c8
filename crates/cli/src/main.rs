//! callmeter CLI — the main entry point.
//!
//! Commands:
//! - `usage`     — Pricing table, cost estimates, exported analytics
//! - `classify`  — Classify an error message and suggest fixes
//! - `simulate`  — Drive monitored calls against a simulated provider
//! - `config`    — Validate, show or locate the configuration

use callmeter_config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

#[derive(Parser)]
#[command(
    name = "callmeter",
    about = "callmeter — rate limiting, cost tracking and usage analytics for model API calls",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Model pricing, cost estimates and exported analytics
    Usage {
        #[command(subcommand)]
        action: UsageAction,
    },

    /// Classify an error message and print remediation suggestions
    Classify {
        /// The error text to classify
        message: String,
    },

    /// Run monitored calls against a simulated provider
    Simulate {
        /// Number of calls to make
        #[arg(short = 'n', long, default_value_t = 20)]
        requests: usize,

        /// Maximum calls in flight at once
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,

        /// Make every K-th call fail (0 disables failures)
        #[arg(short, long, default_value_t = 5)]
        failure_every: usize,

        /// Model name to request
        #[arg(short, long)]
        model: Option<String>,

        /// Where to write the analytics export
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum UsageAction {
    /// List model pricing (per 1K tokens)
    Pricing,

    /// Estimate the cost of a call
    Estimate {
        /// Model name
        #[arg(short, long)]
        model: Option<String>,

        /// Input token count
        #[arg(short, long, default_value_t = 1000)]
        input_tokens: u32,

        /// Output token count
        #[arg(short, long, default_value_t = 1000)]
        output_tokens: u32,
    },

    /// Summarize an exported analytics file
    Show {
        /// Path to the export; defaults to `telemetry.export_path`
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the configuration file
    Validate,
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load under a stderr-only subscriber so events from loading are not
    // lost; the global subscriber needs the loaded log file.
    let loaded = tracing::subscriber::with_default(stderr_subscriber(cli.verbose), AppConfig::load);
    let log_file = loaded
        .as_ref()
        .ok()
        .and_then(|config| config.telemetry.log_file.clone());
    init_tracing(cli.verbose, log_file.as_deref())?;

    match cli.command {
        Commands::Config {
            action: ConfigAction::Validate,
        } => commands::config_cmd::validate(loaded).await,
        Commands::Config {
            action: ConfigAction::Path,
        } => commands::config_cmd::path().await,
        command => run(command, &loaded?).await,
    }
}

async fn run(command: Commands, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Usage { action } => match action {
            UsageAction::Pricing => commands::usage::pricing(config).await?,
            UsageAction::Estimate {
                model,
                input_tokens,
                output_tokens,
            } => {
                let model = model.unwrap_or_else(|| config.default_model.clone());
                commands::usage::estimate(config, &model, input_tokens, output_tokens).await?
            }
            UsageAction::Show { file } => {
                let file = file.unwrap_or_else(|| config.telemetry.export_path.clone());
                commands::usage::show(&file).await?
            }
        },
        Commands::Classify { message } => commands::classify::run(&message).await?,
        Commands::Simulate {
            requests,
            concurrency,
            failure_every,
            model,
            export,
        } => {
            let options = commands::simulate::SimulateOptions {
                requests,
                concurrency,
                failure_every,
                model: model.unwrap_or_else(|| config.default_model.clone()),
                export: export.unwrap_or_else(|| config.telemetry.export_path.clone()),
            };
            commands::simulate::run(config, options).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate(Ok(config.clone())).await?,
            ConfigAction::Show => commands::config_cmd::show(config).await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}

fn env_filter(verbose: bool) -> tracing_subscriber::EnvFilter {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter))
}

fn stderr_subscriber(verbose: bool) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish()
}

/// Console output plus an append-only log file when one is configured.
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file {}: {e}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(())
}
