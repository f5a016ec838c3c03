//! Discrete action indices and the continuous actions they encode

use serde::{Deserialize, Serialize};
use tracing::warn;

use qflow_core::{QFlowError, Result};

/// Index into the discretized action space, in `[0, num_actions)`
pub type ActionIndex = usize;

/// Index used when a continuous action cannot be mapped back
pub const DEFAULT_ACTION: ActionIndex = 0;

/// Continuous action sent to the simulation.
///
/// Both control dimensions are driven by the same scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuousAction([f64; 2]);

impl ContinuousAction {
    pub fn uniform(value: f64) -> Self {
        Self([value, value])
    }

    pub fn from_values(values: [f64; 2]) -> Self {
        Self(values)
    }

    /// The scalar driving the action (first dimension)
    pub fn value(&self) -> f64 {
        self.0[0]
    }

    pub fn values(&self) -> [f64; 2] {
        self.0
    }
}

/// Affine codec between action indices and continuous actions:
/// `value = base + index * step`.
#[derive(Debug, Clone)]
pub struct ActionCodec {
    base: f64,
    step: f64,
    num_actions: usize,
}

impl ActionCodec {
    pub fn new(base: f64, step: f64, num_actions: usize) -> Self {
        Self {
            base,
            step,
            num_actions: num_actions.max(1),
        }
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn index_to_action(&self, index: ActionIndex) -> ContinuousAction {
        ContinuousAction::uniform(self.base + index as f64 * self.step)
    }

    /// Inverse of [`index_to_action`](Self::index_to_action), rounded to the
    /// nearest index and clamped into the action space.
    pub fn action_to_index(&self, action: &ContinuousAction) -> Result<ActionIndex> {
        let value = action.value();
        if !value.is_finite() {
            return Err(QFlowError::InvalidAction(format!("{:?}", action.values())));
        }

        let position = ((value - self.base) / self.step).round();
        if !position.is_finite() {
            return Err(QFlowError::NonFinite(format!(
                "action {value} maps to position {position}"
            )));
        }

        let upper = (self.num_actions - 1) as f64;
        Ok(position.clamp(0.0, upper) as ActionIndex)
    }

    /// [`action_to_index`](Self::action_to_index) with a logged fallback to [`DEFAULT_ACTION`]
    pub fn action_to_index_or_default(&self, action: &ContinuousAction) -> ActionIndex {
        self.action_to_index(action).unwrap_or_else(|e| {
            warn!(action = ?action.values(), "Cannot recover action index: {}", e);
            DEFAULT_ACTION
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_codec() -> ActionCodec {
        ActionCodec::new(2.0, 0.3, 10)
    }

    #[test]
    fn test_index_to_action() {
        let codec = reference_codec();

        assert_eq!(codec.index_to_action(0).values(), [2.0, 2.0]);
        let action = codec.index_to_action(4);
        assert!((action.value() - 3.2).abs() < 1e-12);
        assert_eq!(action.values()[0], action.values()[1]);
    }

    #[test]
    fn test_round_trip_every_index() {
        let codec = reference_codec();
        for index in 0..codec.num_actions() {
            let action = codec.index_to_action(index);
            assert_eq!(codec.action_to_index(&action).unwrap(), index);
        }
    }

    #[test]
    fn test_round_trip_other_parameterisations() {
        for (base, step, n) in [(0.0, 1.0, 5), (-1.5, 0.1, 30), (10.0, -0.7, 12)] {
            let codec = ActionCodec::new(base, step, n);
            for index in 0..n {
                let action = codec.index_to_action(index);
                assert_eq!(codec.action_to_index(&action).unwrap(), index);
            }
        }
    }

    #[test]
    fn test_out_of_range_actions_clamp() {
        let codec = reference_codec();

        assert_eq!(codec.action_to_index(&ContinuousAction::uniform(-5.0)).unwrap(), 0);
        assert_eq!(codec.action_to_index(&ContinuousAction::uniform(99.0)).unwrap(), 9);
        // Between two grid points rounds to the nearest
        assert_eq!(codec.action_to_index(&ContinuousAction::uniform(2.4)).unwrap(), 1);
        assert_eq!(codec.action_to_index(&ContinuousAction::uniform(2.5)).unwrap(), 2);
    }

    #[test]
    fn test_malformed_action_falls_back() {
        let codec = reference_codec();
        let bad = ContinuousAction::uniform(f64::NAN);

        assert!(matches!(
            codec.action_to_index(&bad),
            Err(QFlowError::InvalidAction(_))
        ));
        assert_eq!(codec.action_to_index_or_default(&bad), DEFAULT_ACTION);
        assert_eq!(
            codec.action_to_index_or_default(&ContinuousAction::from_values([f64::INFINITY, 2.0])),
            DEFAULT_ACTION
        );
    }

    #[test]
    fn test_action_serializes_as_pair() {
        let json = serde_json::to_string(&ContinuousAction::uniform(2.0)).unwrap();
        assert_eq!(json, "[2.0,2.0]");
    }
}
