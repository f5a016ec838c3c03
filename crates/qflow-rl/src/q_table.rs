//! Dense tabular action-value store

use ndarray::{Array2, ArrayView1};

use qflow_core::{QFlowError, Result};

use crate::action::ActionIndex;
use crate::state::DiscreteState;

/// Dense `num_states x num_actions` table of utility estimates, zero-initialized.
///
/// Owned by the training loop; the policy reads it through `&QTable` and the
/// learner writes it through `&mut QTable`.
#[derive(Debug, Clone, PartialEq)]
pub struct QTable {
    values: Array2<f64>,
}

impl QTable {
    pub fn new(num_states: usize, num_actions: usize) -> Self {
        Self {
            values: Array2::zeros((num_states.max(1), num_actions.max(1))),
        }
    }

    pub fn num_states(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_actions(&self) -> usize {
        self.values.ncols()
    }

    pub fn value(&self, state: DiscreteState, action: ActionIndex) -> Result<f64> {
        self.values
            .get((state, action))
            .copied()
            .ok_or(QFlowError::OutOfBounds { state, action })
    }

    pub fn update(&mut self, state: DiscreteState, action: ActionIndex, new_value: f64) -> Result<()> {
        let slot = self
            .values
            .get_mut((state, action))
            .ok_or(QFlowError::OutOfBounds { state, action })?;
        *slot = new_value;
        Ok(())
    }

    pub fn row(&self, state: DiscreteState) -> Result<ArrayView1<'_, f64>> {
        if state >= self.num_states() {
            return Err(QFlowError::OutOfBounds { state, action: 0 });
        }
        Ok(self.values.row(state))
    }

    /// Greedy action for `state`.
    ///
    /// Ties go to the lowest index: only a strictly greater value replaces the
    /// current best.
    pub fn best_action(&self, state: DiscreteState) -> Result<ActionIndex> {
        let row = self.row(state)?;
        let mut best = 0;
        let mut best_value = row[0];
        for (action, &value) in row.iter().enumerate().skip(1) {
            if value > best_value {
                best = action;
                best_value = value;
            }
        }
        Ok(best)
    }

    /// `max_a Q[state, a]`
    pub fn max_value(&self, state: DiscreteState) -> Result<f64> {
        Ok(self.row(state)?.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v)))
    }

    /// Copy of the table as nested rows, for reporting
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.values.outer_iter().map(|row| row.to_vec()).collect()
    }
}
