//! QFlow Core - errors, configuration, and shared helpers
//!
//! This crate provides the foundational types used across all QFlow components.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod util;

pub use crate::config::{Config, LearningConfig, LoggingConfig, SimulationConfig, SpacesConfig};
pub use error::{QFlowError, Result};
