//! Configuration management commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use qflow_core::Config;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (defaults, file, environment)
    Show,
    /// Write a configuration file with default values
    Init {
        /// Destination file
        #[arg(default_value = "qflow.toml")]
        path: PathBuf,
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub fn run(cmd: ConfigCommands, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(config_path),
        ConfigCommands::Init { path, force } => init(&path, force),
    }
}

fn show(config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    println!("{}", render(&config)?);
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Configuration file already exists: {}", path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    std::fs::write(path, render(&Config::default())?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Configuration file created: {}", path.display());

    Ok(())
}

/// Render a configuration as TOML
pub fn render(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration")
}
