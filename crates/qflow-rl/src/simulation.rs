//! Capabilities consumed from the external network simulation
//!
//! The transport behind these traits (socket protocol, process launch) is the
//! implementor's concern. Observations cross the boundary as raw JSON values
//! and are validated by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use qflow_core::{Result, SimulationConfig};

use crate::action::ContinuousAction;

/// Response to a single `step`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Raw next observation; `None` when the endpoint sent nothing
    pub observation: Option<Value>,
    pub reward: f64,
    pub done: bool,
    #[serde(default)]
    pub info: Value,
}

/// A live session with the simulation
pub trait Simulation {
    /// Restart an episode. `Ok(None)` means the endpoint produced no observation.
    fn reset(&mut self) -> Result<Option<Value>>;

    /// Submit an action and receive the next observation and reward
    fn step(&mut self, action: &ContinuousAction) -> Result<StepOutcome>;

    /// Whether a previous simulation run is still finishing
    fn is_running(&mut self) -> bool;

    /// Release the session
    fn close(&mut self) -> Result<()>;
}

/// Opens sessions; used for the initial session and for forced reconnections
pub trait SimulationConnector {
    fn connect(&mut self, config: &SimulationConfig) -> Result<Box<dyn Simulation>>;
}

impl<F> SimulationConnector for F
where
    F: FnMut(&SimulationConfig) -> Result<Box<dyn Simulation>>,
{
    fn connect(&mut self, config: &SimulationConfig) -> Result<Box<dyn Simulation>> {
        self(config)
    }
}
