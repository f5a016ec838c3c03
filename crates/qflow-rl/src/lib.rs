//! QFlow RL - tabular Q-learning for network simulation control
//!
//! This crate provides the learning loop: state discretization, the action
//! codec, the Q-table, epsilon-greedy selection, the TD learner, and the
//! episode/training drivers that cope with a flaky simulation endpoint.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::float_cmp)]
#![allow(clippy::similar_names)]

pub mod action;
pub mod engine;
pub mod episode;
pub mod learner;
pub mod policy;
pub mod q_table;
pub mod simulation;
pub mod state;
pub mod surrogate;
pub mod transition;
pub mod wait;

pub use action::{ActionCodec, ActionIndex, ContinuousAction};
pub use engine::{EpisodeReport, EpisodeStatus, TrainingLoop, TrainingSummary};
pub use episode::{EpisodeOutcome, EpisodeResult, EpisodeRunner, EpisodeSettings, Termination};
pub use learner::{Learner, UpdateOutcome};
pub use policy::{EpsilonGreedy, ExplorationSchedule, Selection};
pub use q_table::QTable;
pub use simulation::{Simulation, SimulationConnector, StepOutcome};
pub use state::{DiscreteState, Discretized, Observation, StateDiscretizer};
pub use surrogate::{SurrogateConfig, SurrogateConnector, SurrogateSimulation};
pub use transition::Transition;
pub use wait::{wait_while, WaitOutcome};
