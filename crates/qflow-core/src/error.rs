//! Error types for QFlow

use thiserror::Error;

/// Main error type for QFlow
#[derive(Error, Debug)]
pub enum QFlowError {
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Q-table index out of bounds: state {state}, action {action}")]
    OutOfBounds { state: usize, action: usize },

    #[error("Non-finite value: {0}")]
    NonFinite(String),

    #[error("Simulation error: {0}")]
    Simulation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for QFlow operations
pub type Result<T> = std::result::Result<T, QFlowError>;
