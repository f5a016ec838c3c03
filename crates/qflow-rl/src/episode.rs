//! Single-episode driver: reset with retry, step loop, termination
//!
//! An episode moves through [`EpisodePhase::AwaitingReset`],
//! [`EpisodePhase::Running`] and [`EpisodePhase::Done`]. Malformed data from
//! the simulation never reaches the learner: a bad reset counts as a failed
//! attempt, a bad step ends the episode.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use qflow_core::util::describe_raw;
use qflow_core::SimulationConfig;

use crate::learner::Learner;
use crate::policy::EpsilonGreedy;
use crate::q_table::QTable;
use crate::simulation::Simulation;
use crate::state::Observation;
use crate::wait::wait_while;

/// Retry and bounding knobs for one episode
#[derive(Debug, Clone)]
pub struct EpisodeSettings {
    pub reset_timeout: Duration,
    pub poll_interval: Duration,
    pub max_reset_retries: u32,
    pub max_steps: Option<u64>,
}

impl EpisodeSettings {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            reset_timeout: config.reset_timeout(),
            poll_interval: config.poll_interval(),
            max_reset_retries: config.max_reset_retries,
            max_steps: config.max_steps_per_episode,
        }
    }
}

impl Default for EpisodeSettings {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodePhase {
    AwaitingReset,
    Running,
    Done,
}

/// Why a played episode stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The simulation reported the end of the episode
    Done,
    /// The per-episode step cap was reached
    StepLimit,
    /// A step returned a missing or malformed observation
    MalformedStep,
    /// The step call itself failed
    StepFailed,
}

/// Accumulated result of a played episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub total_reward: f64,
    pub steps: u64,
    pub updates: u64,
    pub termination: Termination,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeOutcome {
    /// The episode ran (possibly cut short)
    Played(EpisodeResult),
    /// No reset attempt produced a valid observation; the session should be replaced
    Unusable { attempts: u32 },
}

/// Drives one episode against a simulation session
pub struct EpisodeRunner {
    policy: EpsilonGreedy,
    learner: Learner,
    settings: EpisodeSettings,
    phase: EpisodePhase,
}

impl EpisodeRunner {
    pub fn new(policy: EpsilonGreedy, learner: Learner, settings: EpisodeSettings) -> Self {
        Self {
            policy,
            learner,
            settings,
            phase: EpisodePhase::Done,
        }
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn settings(&self) -> &EpisodeSettings {
        &self.settings
    }

    /// Run a single episode, learning into `table` with exploration rate `epsilon`
    pub fn run(
        &mut self,
        simulation: &mut dyn Simulation,
        table: &mut QTable,
        epsilon: f64,
    ) -> EpisodeOutcome {
        self.phase = EpisodePhase::AwaitingReset;
        let Some(mut state) = self.reset_with_retry(simulation) else {
            self.phase = EpisodePhase::Done;
            return EpisodeOutcome::Unusable {
                attempts: self.settings.max_reset_retries,
            };
        };
        debug!(observation = ?state.values(), "Episode started");

        self.phase = EpisodePhase::Running;
        let mut total_reward = 0.0;
        let mut steps = 0;
        let mut updates = 0;

        let termination = loop {
            if self.settings.max_steps.is_some_and(|max| steps >= max) {
                break Termination::StepLimit;
            }

            let action = self.policy.select(table, &state, epsilon);
            let outcome = match simulation.step(&action) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(action = ?action.values(), "Simulation step failed, ending episode: {}", e);
                    break Termination::StepFailed;
                }
            };

            let next_state = match outcome.observation.as_ref().map(Observation::from_raw) {
                Some(Ok(observation)) => observation,
                Some(Err(e)) => {
                    warn!("Next state is invalid, ending episode: {}", e);
                    break Termination::MalformedStep;
                }
                None => {
                    warn!("Next state is missing, ending episode");
                    break Termination::MalformedStep;
                }
            };

            steps += 1;
            // The learner logs and skips a non-finite reward; keep it out of the total
            if outcome.reward.is_finite() {
                total_reward += outcome.reward;
            }
            debug!(
                step = steps,
                action = action.value(),
                reward = outcome.reward,
                total_reward,
                "Step complete"
            );

            if self
                .learner
                .update(table, &state, &action, outcome.reward, &next_state)
                .is_applied()
            {
                updates += 1;
            }
            state = next_state;

            if outcome.done {
                break Termination::Done;
            }
        };

        self.phase = EpisodePhase::Done;
        EpisodeOutcome::Played(EpisodeResult {
            total_reward,
            steps,
            updates,
            termination,
        })
    }

    /// Reset the simulation, waiting out any in-flight run before each attempt
    fn reset_with_retry(&self, simulation: &mut dyn Simulation) -> Option<Observation> {
        let max_attempts = self.settings.max_reset_retries;

        for attempt in 1..=max_attempts {
            let waited = wait_while(self.settings.reset_timeout, self.settings.poll_interval, || {
                simulation.is_running()
            })
            .into_result(self.settings.reset_timeout, "simulation still running");
            if let Err(e) = waited {
                warn!(attempt, "{}, resetting anyway", e);
            }

            match simulation.reset() {
                Ok(Some(raw)) => match Observation::from_raw(&raw) {
                    Ok(observation) => return Some(observation),
                    Err(e) => warn!(raw = %describe_raw(&raw), "Reset returned {}", e),
                },
                Ok(None) => warn!("Reset returned no observation"),
                Err(e) => warn!("Reset failed: {}", e),
            }
            warn!("Reset attempt {}/{} failed", attempt, max_attempts);
        }

        error!("Failed to reset simulation after {} attempts", max_attempts);
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use serde_json::{json, Value};

    use qflow_core::{QFlowError, Result};

    use super::*;
    use crate::action::{ActionCodec, ContinuousAction};
    use crate::simulation::StepOutcome;
    use crate::state::StateDiscretizer;

    /// Plays back canned responses; exhausted scripts behave like a dead endpoint
    #[derive(Default)]
    struct ScriptedSimulation {
        resets: VecDeque<Result<Option<Value>>>,
        steps: VecDeque<Result<StepOutcome>>,
        busy_polls: u32,
        reset_calls: u32,
        actions: Vec<ContinuousAction>,
    }

    impl Simulation for ScriptedSimulation {
        fn reset(&mut self) -> Result<Option<Value>> {
            self.reset_calls += 1;
            self.resets.pop_front().unwrap_or(Ok(None))
        }

        fn step(&mut self, action: &ContinuousAction) -> Result<StepOutcome> {
            self.actions.push(*action);
            self.steps
                .pop_front()
                .unwrap_or_else(|| Err(QFlowError::Simulation("script exhausted".to_string())))
        }

        fn is_running(&mut self) -> bool {
            if self.busy_polls > 0 {
                self.busy_polls -= 1;
                true
            } else {
                false
            }
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn step(observation: Value, reward: f64, done: bool) -> Result<StepOutcome> {
        Ok(StepOutcome {
            observation: Some(observation),
            reward,
            done,
            info: Value::Null,
        })
    }

    fn runner(max_steps: Option<u64>) -> EpisodeRunner {
        let discretizer = StateDiscretizer::new(3);
        let codec = ActionCodec::new(2.0, 0.3, 10);
        EpisodeRunner::new(
            EpsilonGreedy::new(discretizer.clone(), codec.clone(), 8),
            Learner::new(0.6, 0.9, discretizer, codec),
            EpisodeSettings {
                reset_timeout: Duration::from_millis(20),
                poll_interval: Duration::from_millis(1),
                max_reset_retries: 3,
                max_steps,
            },
        )
    }

    #[test]
    fn test_episode_runs_to_done() {
        let mut sim = ScriptedSimulation {
            resets: VecDeque::from([Ok(Some(json!([2.0])))]),
            steps: VecDeque::from([
                step(json!([2.0]), 0.5, false),
                step(json!([3.0]), 0.25, false),
                step(json!([1.0]), 1.0, true),
            ]),
            ..Default::default()
        };
        let mut table = QTable::new(3, 10);
        let mut runner = runner(None);

        let outcome = runner.run(&mut sim, &mut table, 0.0);

        let EpisodeOutcome::Played(result) = outcome else {
            panic!("expected a played episode, got {outcome:?}");
        };
        assert_eq!(result.termination, Termination::Done);
        assert_eq!(result.steps, 3);
        assert_eq!(result.updates, 3);
        assert!((result.total_reward - 1.75).abs() < 1e-12);
        assert_eq!(runner.phase(), EpisodePhase::Done);
        assert_eq!(sim.actions.len(), 3);
    }

    #[test]
    fn test_three_null_resets_make_episode_unusable() {
        let mut sim = ScriptedSimulation {
            resets: VecDeque::from([Ok(None), Ok(None), Ok(None), Ok(Some(json!([1.0])))]),
            ..Default::default()
        };
        let mut table = QTable::new(3, 10);

        let outcome = runner(None).run(&mut sim, &mut table, 0.5);

        assert_eq!(outcome, EpisodeOutcome::Unusable { attempts: 3 });
        assert_eq!(sim.reset_calls, 3);
        assert!(sim.actions.is_empty());
        assert_eq!(table, QTable::new(3, 10));
    }

    #[test]
    fn test_reset_recovers_within_retry_bound() {
        let mut sim = ScriptedSimulation {
            resets: VecDeque::from([
                Err(QFlowError::Simulation("socket closed".to_string())),
                Ok(Some(json!("garbage"))),
                Ok(Some(json!([3.0, 12.0]))),
            ]),
            steps: VecDeque::from([step(json!([3.0]), 1.0, true)]),
            ..Default::default()
        };
        let mut table = QTable::new(3, 10);

        let outcome = runner(None).run(&mut sim, &mut table, 0.0);

        assert!(matches!(outcome, EpisodeOutcome::Played(_)));
        assert_eq!(sim.reset_calls, 3);
        assert_eq!(table.value(2, 0).unwrap(), 0.6);
    }

    #[test]
    fn test_malformed_step_aborts_without_learning() {
        let mut sim = ScriptedSimulation {
            resets: VecDeque::from([Ok(Some(json!([2.0])))]),
            steps: VecDeque::from([
                step(json!([2.0]), 1.0, false),
                step(json!(["nan"]), 5.0, false),
                step(json!([2.0]), 1.0, true),
            ]),
            ..Default::default()
        };
        let mut table = QTable::new(3, 10);

        let outcome = runner(None).run(&mut sim, &mut table, 0.0);

        let EpisodeOutcome::Played(result) = outcome else {
            panic!("expected a played episode");
        };
        assert_eq!(result.termination, Termination::MalformedStep);
        assert_eq!(result.steps, 1);
        assert_eq!(result.updates, 1);
        assert_eq!(result.total_reward, 1.0);
        // The third scripted step is never requested
        assert_eq!(sim.steps.len(), 1);
    }

    #[test]
    fn test_missing_observation_and_step_error_end_episode() {
        let mut sim = ScriptedSimulation {
            resets: VecDeque::from([Ok(Some(json!([1.0])))]),
            steps: VecDeque::from([Ok(StepOutcome {
                observation: None,
                reward: 1.0,
                done: false,
                info: Value::Null,
            })]),
            ..Default::default()
        };
        let mut table = QTable::new(3, 10);
        let mut runner = runner(None);

        let EpisodeOutcome::Played(result) = runner.run(&mut sim, &mut table, 0.0) else {
            panic!("expected a played episode");
        };
        assert_eq!(result.termination, Termination::MalformedStep);
        assert_eq!(result.updates, 0);

        let mut sim = ScriptedSimulation {
            resets: VecDeque::from([Ok(Some(json!([1.0])))]),
            ..Default::default()
        };
        let EpisodeOutcome::Played(result) = runner.run(&mut sim, &mut table, 0.0) else {
            panic!("expected a played episode");
        };
        assert_eq!(result.termination, Termination::StepFailed);
        assert_eq!(result.steps, 0);
        assert_eq!(table, QTable::new(3, 10));
    }

    #[test]
    fn test_non_finite_reward_is_skipped_not_fatal() {
        let mut sim = ScriptedSimulation {
            resets: VecDeque::from([Ok(Some(json!([1.0])))]),
            steps: VecDeque::from([
                step(json!([1.0]), 1.0, false),
                step(json!([1.0]), f64::NAN, false),
                step(json!([1.0]), 1.0, false),
                step(json!([1.0]), 1.0, true),
            ]),
            ..Default::default()
        };
        let mut table = QTable::new(3, 10);

        let EpisodeOutcome::Played(result) = runner(None).run(&mut sim, &mut table, 0.0) else {
            panic!("expected a played episode");
        };
        assert_eq!(result.termination, Termination::Done);
        assert_eq!(result.steps, 4);
        assert_eq!(result.updates, 3);
        assert_eq!(result.total_reward, 3.0);
        assert!(table.rows().iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_step_limit_bounds_episode() {
        let mut sim = ScriptedSimulation {
            resets: VecDeque::from([Ok(Some(json!([2.0])))]),
            steps: (0..10).map(|_| step(json!([2.0]), 0.1, false)).collect(),
            ..Default::default()
        };
        let mut table = QTable::new(3, 10);

        let EpisodeOutcome::Played(result) = runner(Some(4)).run(&mut sim, &mut table, 1.0) else {
            panic!("expected a played episode");
        };
        assert_eq!(result.termination, Termination::StepLimit);
        assert_eq!(result.steps, 4);
        assert_eq!(sim.actions.len(), 4);
    }

    #[test]
    fn test_waits_out_running_simulation_before_reset() {
        let mut sim = ScriptedSimulation {
            resets: VecDeque::from([Ok(Some(json!([2.0])))]),
            steps: VecDeque::from([step(json!([2.0]), 0.0, true)]),
            busy_polls: 3,
            ..Default::default()
        };
        let mut table = QTable::new(3, 10);

        let outcome = runner(None).run(&mut sim, &mut table, 0.0);

        assert!(matches!(outcome, EpisodeOutcome::Played(_)));
        assert_eq!(sim.busy_polls, 0);
    }

    #[test]
    fn test_reset_proceeds_after_wait_timeout() {
        let mut sim = ScriptedSimulation {
            resets: VecDeque::from([Ok(Some(json!([2.0])))]),
            steps: VecDeque::from([step(json!([2.0]), 0.0, true)]),
            busy_polls: u32::MAX,
            ..Default::default()
        };
        let mut table = QTable::new(3, 10);

        let outcome = runner(None).run(&mut sim, &mut table, 0.0);

        assert!(matches!(outcome, EpisodeOutcome::Played(_)));
        assert_eq!(sim.reset_calls, 1);
    }
}
