//! CLI command modules

use std::path::Path;

use anyhow::Result;

use qflow_core::Config;

pub mod config;
pub mod train;

/// Load configuration from an explicit file, or search the standard locations
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(Some(path)),
        None => Config::load(),
    }
}
