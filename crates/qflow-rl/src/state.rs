//! Observations and state discretization

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use qflow_core::util::describe_raw;
use qflow_core::{QFlowError, Result};

/// Discrete state bucket, in `[0, num_states)`
pub type DiscreteState = usize;

/// Bucket used whenever an observation cannot be discretized
pub const DEFAULT_STATE: DiscreteState = 0;

/// A validated observation: a non-empty sequence of finite readings.
///
/// The first reading is the signal used for discretization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Observation(Vec<f64>);

impl Observation {
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(QFlowError::InvalidObservation("empty observation".to_string()));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(QFlowError::InvalidObservation(format!(
                "non-finite reading {bad} in {values:?}"
            )));
        }
        Ok(Self(values))
    }

    /// Validate a raw observation as delivered by the simulation endpoint
    pub fn from_raw(raw: &Value) -> Result<Self> {
        let items = raw.as_array().ok_or_else(|| {
            QFlowError::InvalidObservation(format!("not a sequence: {}", describe_raw(raw)))
        })?;

        let values = items
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                QFlowError::InvalidObservation(format!("non-numeric element in {}", describe_raw(raw)))
            })?;

        Self::new(values)
    }

    /// The discretization signal
    pub fn signal(&self) -> f64 {
        self.0[0]
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// Outcome of discretizing a raw observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discretized {
    Valid(DiscreteState),
    Invalid,
}

impl Discretized {
    /// Fall back to [`DEFAULT_STATE`] for invalid input
    pub fn or_default(self) -> DiscreteState {
        match self {
            Discretized::Valid(state) => state,
            Discretized::Invalid => DEFAULT_STATE,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Discretized::Valid(_))
    }
}

/// Maps observations onto a fixed number of state buckets.
///
/// The signal is treated as a 1-based level: `trunc(signal - 1)` clamped
/// into `[0, num_states)`. Out-of-range readings are clamped, not rejected.
#[derive(Debug, Clone)]
pub struct StateDiscretizer {
    num_states: usize,
}

impl StateDiscretizer {
    pub fn new(num_states: usize) -> Self {
        Self {
            num_states: num_states.max(1),
        }
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// Bucket for a single signal value
    pub fn bucket(&self, signal: f64) -> Discretized {
        if !signal.is_finite() {
            return Discretized::Invalid;
        }
        let level = (signal - 1.0).trunc();
        let upper = (self.num_states - 1) as f64;
        Discretized::Valid(level.clamp(0.0, upper) as DiscreteState)
    }

    /// Classify a raw, possibly missing observation without applying a fallback
    pub fn classify(&self, raw: Option<&Value>) -> Discretized {
        match raw.map(Observation::from_raw) {
            Some(Ok(observation)) => self.bucket(observation.signal()),
            _ => Discretized::Invalid,
        }
    }

    /// Discretize a raw observation, falling back to [`DEFAULT_STATE`] on invalid input
    pub fn discretize(&self, raw: Option<&Value>) -> DiscreteState {
        let result = self.classify(raw);
        if !result.is_valid() {
            warn!(
                raw = %raw.map_or_else(|| "<missing>".to_string(), describe_raw),
                "Invalid observation, using default state {}",
                DEFAULT_STATE
            );
        }
        result.or_default()
    }

    /// Discretize an already validated observation
    pub fn discretize_observation(&self, observation: &Observation) -> DiscreteState {
        self.bucket(observation.signal()).or_default()
    }
}
