//! One-step Q-learning update

use tracing::{debug, warn};

use qflow_core::{QFlowError, Result};

use crate::action::{ActionCodec, ContinuousAction};
use crate::q_table::QTable;
use crate::state::{Observation, StateDiscretizer};
use crate::transition::Transition;

/// Result of a best-effort table update
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOutcome {
    Applied { previous: f64, updated: f64 },
    Skipped,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied { .. })
    }
}

/// Temporal-difference learner:
/// `Q[s,a] += alpha * (r + gamma * max_a' Q[s',a'] - Q[s,a])`
#[derive(Debug, Clone)]
pub struct Learner {
    alpha: f64,
    gamma: f64,
    discretizer: StateDiscretizer,
    codec: ActionCodec,
}

impl Learner {
    pub fn new(alpha: f64, gamma: f64, discretizer: StateDiscretizer, codec: ActionCodec) -> Self {
        Self {
            alpha,
            gamma,
            discretizer,
            codec,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Discretize an observed step into table coordinates
    pub fn transition(
        &self,
        state: &Observation,
        action: &ContinuousAction,
        reward: f64,
        next_state: &Observation,
    ) -> Transition {
        Transition::new(
            self.discretizer.discretize_observation(state),
            self.codec.action_to_index_or_default(action),
            reward,
            self.discretizer.discretize_observation(next_state),
        )
    }

    /// Learn from one observed step. Failures leave the table untouched.
    pub fn update(
        &self,
        table: &mut QTable,
        state: &Observation,
        action: &ContinuousAction,
        reward: f64,
        next_state: &Observation,
    ) -> UpdateOutcome {
        let transition = self.transition(state, action, reward, next_state);
        match self.apply(table, &transition) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(?transition, "Q-table update skipped: {}", e);
                UpdateOutcome::Skipped
            }
        }
    }

    /// Apply the TD rule for an already discretized transition
    pub fn apply(&self, table: &mut QTable, transition: &Transition) -> Result<UpdateOutcome> {
        if !transition.reward.is_finite() {
            return Err(QFlowError::NonFinite(format!("reward {}", transition.reward)));
        }

        let current = table.value(transition.state, transition.action)?;
        let best_next = table.max_value(transition.next_state)?;
        let td_error = transition.reward + self.gamma * best_next - current;
        let updated = current + self.alpha * td_error;

        if !updated.is_finite() {
            return Err(QFlowError::NonFinite(format!(
                "updated value {updated} (current {current}, td error {td_error})"
            )));
        }

        table.update(transition.state, transition.action, updated)?;
        debug!(
            state = transition.state,
            action = transition.action,
            "Q updated {:.4} -> {:.4}",
            current,
            updated
        );

        Ok(UpdateOutcome::Applied {
            previous: current,
            updated,
        })
    }
}
