//! In-process stand-in for the ns-3 OLSR scenario
//!
//! The observation is the routing "Q level" in `{1, 2, 3}` reported by the
//! OLSR nodes; the action sets the topology-control (TC) interval in seconds.
//! Packet delivery ratio (PDR, percent) peaks when the TC interval matches
//! the level's sweet spot, and the reward is `pdr / 100` once PDR reaches
//! 25%, zero below that.
//!
//! Faults can be injected to exercise reset retries and malformed steps.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use qflow_core::{QFlowError, Result, SimulationConfig};

use crate::action::ContinuousAction;
use crate::simulation::{Simulation, SimulationConnector, StepOutcome};

/// PDR (percent) below which the reward is zero
pub const PDR_THRESHOLD: f64 = 25.0;

const MIN_LEVEL: u8 = 1;
const MAX_LEVEL: u8 = 3;

/// Behaviour of the surrogate scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurrogateConfig {
    /// Steps until the simulated run ends
    pub episode_steps: u64,
    /// Probability that a reset yields no observation
    pub reset_failure_rate: f64,
    /// Probability that a step yields a missing observation
    pub malformed_rate: f64,
    /// `is_running` polls that report busy after a run ends
    pub wind_down_polls: u32,
    /// Standard spread of the PDR noise, in percent
    pub pdr_noise: f64,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            episode_steps: 20,
            reset_failure_rate: 0.0,
            malformed_rate: 0.0,
            wind_down_polls: 0,
            pdr_noise: 5.0,
        }
    }
}

/// TC interval with the best delivery ratio for a given level
pub fn optimal_tc_interval(level: u8) -> f64 {
    2.0 + 0.9 * f64::from(level)
}

/// Noise-free delivery ratio (percent) for a level and TC interval
pub fn expected_pdr(level: u8, tc_interval: f64) -> f64 {
    (92.0 - 30.0 * (tc_interval - optimal_tc_interval(level)).abs()).clamp(0.0, 100.0)
}

/// Reward for a measured delivery ratio
pub fn reward_for_pdr(pdr: f64) -> f64 {
    if pdr >= PDR_THRESHOLD {
        pdr / 100.0
    } else {
        0.0
    }
}

/// One surrogate session
pub struct SurrogateSimulation {
    config: SurrogateConfig,
    rng: StdRng,
    level: u8,
    steps: u64,
    in_episode: bool,
    busy_polls: u32,
    closed: bool,
}

impl SurrogateSimulation {
    pub fn new(config: SurrogateConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            level: MIN_LEVEL,
            steps: 0,
            in_episode: false,
            busy_polls: 0,
            closed: false,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(QFlowError::Simulation("session closed".to_string()));
        }
        Ok(())
    }

    fn observation(&self) -> Value {
        json!([f64::from(self.level)])
    }

    /// Node mobility drifts the level by at most one per step
    fn drift_level(&mut self) {
        let delta: i8 = match self.rng.gen_range(0..4) {
            0 => -1,
            1 => 1,
            _ => 0,
        };
        let next = i16::from(self.level) + i16::from(delta);
        self.level = next.clamp(i16::from(MIN_LEVEL), i16::from(MAX_LEVEL)) as u8;
    }

    fn measure_pdr(&mut self, tc_interval: f64) -> f64 {
        let noise = self.config.pdr_noise * (self.rng.gen::<f64>() * 2.0 - 1.0);
        (expected_pdr(self.level, tc_interval) + noise).clamp(0.0, 100.0)
    }
}

impl Simulation for SurrogateSimulation {
    fn reset(&mut self) -> Result<Option<Value>> {
        self.ensure_open()?;
        if self.rng.gen::<f64>() < self.config.reset_failure_rate {
            debug!("Surrogate reset failure injected");
            return Ok(None);
        }

        self.level = self.rng.gen_range(MIN_LEVEL..=MAX_LEVEL);
        self.steps = 0;
        self.in_episode = true;
        Ok(Some(self.observation()))
    }

    fn step(&mut self, action: &ContinuousAction) -> Result<StepOutcome> {
        self.ensure_open()?;
        if !self.in_episode {
            return Err(QFlowError::Simulation("step before reset".to_string()));
        }

        let tc_interval = action.value();
        let pdr = self.measure_pdr(tc_interval);
        let reward = reward_for_pdr(pdr);

        self.steps += 1;
        self.drift_level();

        let done = self.steps >= self.config.episode_steps;
        if done {
            self.in_episode = false;
            self.busy_polls = self.config.wind_down_polls;
        }

        let observation = if self.rng.gen::<f64>() < self.config.malformed_rate {
            debug!("Surrogate malformed observation injected");
            None
        } else {
            Some(self.observation())
        };

        Ok(StepOutcome {
            observation,
            reward,
            done,
            info: json!({ "pdr": pdr, "tc_interval": tc_interval }),
        })
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
        self.closed = true;
        self.in_episode = false;
        Ok(())
    }
}

/// Opens surrogate sessions.
///
/// Each session is seeded with `seed + session number` so a reconnect does
/// not replay the failures that poisoned the previous session.
#[derive(Debug, Clone, Default)]
pub struct SurrogateConnector {
    config: SurrogateConfig,
    sessions: u64,
}

impl SurrogateConnector {
    pub fn new(config: SurrogateConfig) -> Self {
        Self {
            config,
            sessions: 0,
        }
    }

    /// Number of sessions opened so far
    pub fn sessions(&self) -> u64 {
        self.sessions
    }
}

impl SimulationConnector for SurrogateConnector {
    fn connect(&mut self, config: &SimulationConfig) -> Result<Box<dyn Simulation>> {
        if !config.start_sim {
            return Err(QFlowError::Simulation(format!(
                "start_sim is disabled but the surrogate cannot attach to a running simulator at {}",
                config.endpoint
            )));
        }
        let seed = config.seed.wrapping_add(self.sessions);
        self.sessions += 1;
        info!(
            endpoint = %config.endpoint,
            seed,
            session = self.sessions,
            "Connected to surrogate OLSR simulation"
        );
        Ok(Box::new(SurrogateSimulation::new(self.config.clone(), seed)))
    }
}
