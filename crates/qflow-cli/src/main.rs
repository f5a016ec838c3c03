//! QFlow CLI - train the Q-learning agent from the command line
//!
//! Runs against the in-process surrogate OLSR simulation; the real ns-3
//! endpoint plugs in through `qflow_rl::SimulationConnector`.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qflow_core::util::load_env_file;
use qflow_core::LoggingConfig;

mod commands;

use commands::{config, load_config, train};

#[derive(Parser)]
#[command(name = "qflow")]
#[command(author, version, about = "QFlow - Q-learning control for network simulations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./qflow.toml or ~/.config/qflow/qflow.toml)
    #[arg(short, long, global = true, env = "QFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the agent against the surrogate simulation
    Train(train::TrainArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

fn main() -> Result<()> {
    // qflow.env has to be applied before clap reads QFLOW_CONFIG
    let env_file = load_env_file();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => {
            let config = load_config(cli.config.as_deref())?;
            init_tracing(&config.logging, cli.verbose);
            log_env_file(env_file.as_deref());
            train::run(args, config)
        }
        Commands::Config(cmd) => {
            init_tracing(&LoggingConfig::default(), cli.verbose);
            log_env_file(env_file.as_deref());
            config::run(cmd, cli.config.as_deref())
        }
    }
}

fn log_env_file(path: Option<&Path>) {
    if let Some(path) = path {
        tracing::debug!("Loaded environment from {}", path.display());
    }
}

/// Install the global subscriber; `RUST_LOG` takes precedence over the configured level
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("qflow={level},qflow_rl={level},qflow_core={level}").into()
    });

    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
