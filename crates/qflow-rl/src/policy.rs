//! Epsilon-greedy action selection and the exploration schedule

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::warn;

use qflow_core::LearningConfig;

use crate::action::{ActionCodec, ActionIndex, ContinuousAction, DEFAULT_ACTION};
use crate::q_table::QTable;
use crate::state::{DiscreteState, Observation, StateDiscretizer};

/// A chosen action together with how it was chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Selection {
    pub state: DiscreteState,
    pub index: ActionIndex,
    pub action: ContinuousAction,
    pub explored: bool,
}

/// Epsilon-greedy policy over a discretized action space.
///
/// Epsilon is supplied per call; the policy only owns its random source.
pub struct EpsilonGreedy {
    discretizer: StateDiscretizer,
    codec: ActionCodec,
    rng: StdRng,
}

impl EpsilonGreedy {
    pub fn new(discretizer: StateDiscretizer, codec: ActionCodec, seed: u64) -> Self {
        Self {
            discretizer,
            codec,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn codec(&self) -> &ActionCodec {
        &self.codec
    }

    pub fn discretizer(&self) -> &StateDiscretizer {
        &self.discretizer
    }

    /// Pick an action index for `observation`
    pub fn select_index(
        &mut self,
        table: &QTable,
        observation: &Observation,
        epsilon: f64,
    ) -> Selection {
        let state = self.discretizer.discretize_observation(observation);
        let explored = self.rng.gen::<f64>() < epsilon;

        let index = if explored {
            self.rng.gen_range(0..self.codec.num_actions())
        } else {
            table.best_action(state).unwrap_or_else(|e| {
                warn!("Greedy lookup failed, using action {}: {}", DEFAULT_ACTION, e);
                DEFAULT_ACTION
            })
        };

        Selection {
            state,
            index,
            action: self.codec.index_to_action(index),
            explored,
        }
    }

    /// Pick the continuous action to submit for `observation`
    pub fn select(
        &mut self,
        table: &QTable,
        observation: &Observation,
        epsilon: f64,
    ) -> ContinuousAction {
        self.select_index(table, observation, epsilon).action
    }
}

/// Multiplicative epsilon decay with a floor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplorationSchedule {
    initial: f64,
    min: f64,
    decay: f64,
    current: f64,
}

impl ExplorationSchedule {
    pub fn new(initial: f64, min: f64, decay: f64) -> Self {
        Self {
            initial,
            min,
            decay,
            current: initial,
        }
    }

    pub fn from_config(config: &LearningConfig) -> Self {
        Self::new(config.epsilon, config.epsilon_min, config.epsilon_decay)
    }

    pub fn epsilon(&self) -> f64 {
        self.current
    }

    /// `epsilon := max(min, epsilon * decay)`; returns the new epsilon
    pub fn decay(&mut self) -> f64 {
        self.current = self.min.max(self.current * self.decay);
        self.current
    }

    /// Epsilon after `episodes` decays from the initial value
    pub fn epsilon_after(&self, episodes: u32) -> f64 {
        let mut schedule = Self::new(self.initial, self.min, self.decay);
        for _ in 0..episodes {
            schedule.decay();
        }
        schedule.current
    }
}
