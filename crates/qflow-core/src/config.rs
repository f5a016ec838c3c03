//! Configuration loading for QFlow
//!
//! Values come from, in increasing priority: built-in defaults, a TOML file
//! (`QFLOW_CONFIG`, `./qflow.toml`, `~/.config/qflow/qflow.toml`) and
//! `QFLOW__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::QFlowError;

/// Top-level configuration for a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub learning: LearningConfig,
    pub spaces: SpacesConfig,
    pub logging: LoggingConfig,
}

/// External simulation endpoint and the resilience knobs around it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Endpoint identifier handed to the connector
    pub endpoint: String,
    pub seed: u64,
    /// Ask the connector to launch the simulator process itself
    pub start_sim: bool,
    pub reset_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_reset_retries: u32,
    pub episode_cooldown_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps_per_episode: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            endpoint: "tcp://localhost:5555".to_string(),
            seed: 8,
            start_sim: true,
            reset_timeout_secs: 30,
            poll_interval_ms: 1000,
            max_reset_retries: 3,
            episode_cooldown_ms: 2000,
            max_steps_per_episode: None,
        }
    }
}

impl SimulationConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn episode_cooldown(&self) -> Duration {
        Duration::from_millis(self.episode_cooldown_ms)
    }
}

/// Q-learning hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub alpha: f64,
    pub gamma: f64,
    pub epsilon: f64,
    pub epsilon_min: f64,
    pub epsilon_decay: f64,
    pub episodes: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            gamma: 0.9,
            epsilon: 0.7,
            epsilon_min: 0.01,
            epsilon_decay: 0.99,
            episodes: 100,
        }
    }
}

/// Shape of the discretized state and action spaces
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpacesConfig {
    pub num_states: usize,
    pub num_actions: usize,
    pub action_base: f64,
    pub action_step: f64,
}

impl Default for SpacesConfig {
    fn default() -> Self {
        Self {
            num_states: 3,
            num_actions: 10,
            action_base: 2.0,
            action_step: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// Append one JSON line per episode report to this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            report_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the first config file found and the environment
    pub fn load() -> Result<Self> {
        let config_path = Self::find_config_file();
        Self::load_from(config_path.as_deref())
    }

    /// Load configuration from an explicit file (if any) and the environment
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::<config::builder::DefaultState>::default();

        if let Some(path) = path {
            tracing::info!("Loading config from: {:?}", path);
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        } else {
            tracing::info!("No config file found, using defaults");
        }

        builder = builder.add_source(
            Environment::with_prefix("QFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject hyperparameters the learning loop cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        let learning = &self.learning;
        let spaces = &self.spaces;

        if !(learning.alpha > 0.0 && learning.alpha <= 1.0) {
            return Err(invalid(format!("learning.alpha must be in (0, 1], got {}", learning.alpha)));
        }
        if !(0.0..1.0).contains(&learning.gamma) {
            return Err(invalid(format!("learning.gamma must be in [0, 1), got {}", learning.gamma)));
        }
        for (name, value) in [
            ("epsilon", learning.epsilon),
            ("epsilon_min", learning.epsilon_min),
            ("epsilon_decay", learning.epsilon_decay),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("learning.{name} must be in [0, 1], got {value}")));
            }
        }
        if learning.epsilon_min > learning.epsilon {
            return Err(invalid(format!(
                "learning.epsilon_min ({}) exceeds learning.epsilon ({})",
                learning.epsilon_min, learning.epsilon
            )));
        }
        if spaces.num_states == 0 || spaces.num_actions == 0 {
            return Err(invalid("spaces.num_states and spaces.num_actions must be positive"));
        }
        if !spaces.action_base.is_finite() {
            return Err(invalid("spaces.action_base must be finite"));
        }
        if !spaces.action_step.is_finite() || spaces.action_step == 0.0 {
            return Err(invalid(format!(
                "spaces.action_step must be finite and non-zero, got {}",
                spaces.action_step
            )));
        }
        if self.simulation.max_reset_retries == 0 {
            return Err(invalid("simulation.max_reset_retries must be at least 1"));
        }
        if self.simulation.poll_interval_ms == 0 {
            return Err(invalid("simulation.poll_interval_ms must be at least 1"));
        }
        Ok(())
    }

    /// Find the configuration file
    fn find_config_file() -> Option<PathBuf> {
        // Check in order: QFLOW_CONFIG env, ./qflow.toml, ~/.config/qflow/qflow.toml
        if let Ok(path) = std::env::var("QFLOW_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local = PathBuf::from("qflow.toml");
        if local.exists() {
            return Some(local);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".config").join("qflow").join("qflow.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }
}

fn invalid(message: impl Into<String>) -> QFlowError {
    QFlowError::Config(message.into())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = Config::default();

        assert_eq!(config.simulation.endpoint, "tcp://localhost:5555");
        assert_eq!(config.simulation.seed, 8);
        assert_eq!(config.simulation.reset_timeout(), Duration::from_secs(30));
        assert_eq!(config.simulation.max_reset_retries, 3);
        assert_eq!(config.learning.alpha, 0.6);
        assert_eq!(config.learning.gamma, 0.9);
        assert_eq!(config.learning.epsilon, 0.7);
        assert_eq!(config.learning.episodes, 100);
        assert_eq!(config.spaces.num_states, 3);
        assert_eq!(config.spaces.num_actions, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_hyperparameters() {
        let mut config = Config::default();
        config.learning.gamma = 1.0;
        assert!(matches!(config.validate(), Err(QFlowError::Config(_))));

        let mut config = Config::default();
        config.learning.alpha = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.learning.epsilon_min = 0.9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.spaces.action_step = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.spaces.num_actions = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.max_reset_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_busy_polling() {
        let mut config = Config::default();
        config.simulation.poll_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));

        config.simulation.poll_interval_ms = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_partial_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[learning]
episodes = 5
alpha = 0.25

[spaces]
action_step = 0.5

[simulation]
max_steps_per_episode = 40
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();

        assert_eq!(config.learning.episodes, 5);
        assert_eq!(config.learning.alpha, 0.25);
        // Untouched keys keep their defaults
        assert_eq!(config.learning.gamma, 0.9);
        assert_eq!(config.spaces.action_step, 0.5);
        assert_eq!(config.spaces.action_base, 2.0);
        assert_eq!(config.simulation.max_steps_per_episode, Some(40));
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[learning]\ngamma = 1.5").unwrap();

        assert!(Config::load_from(Some(file.path())).is_err());
    }
}
