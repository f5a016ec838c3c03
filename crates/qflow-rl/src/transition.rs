//! Discretized transitions consumed by the learner

use serde::{Deserialize, Serialize};

use crate::action::ActionIndex;
use crate::state::DiscreteState;

/// A single (s, a, r, s') tuple in table coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: DiscreteState,
    pub action: ActionIndex,
    pub reward: f64,
    pub next_state: DiscreteState,
}

impl Transition {
    pub fn new(state: DiscreteState, action: ActionIndex, reward: f64, next_state: DiscreteState) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_serialization() {
        let transition = Transition::new(1, 4, 0.87, 2);
        let json = serde_json::to_string(&transition).unwrap();
        let parsed: Transition = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, transition);
        assert!(json.contains("\"next_state\":2"));
    }
}
