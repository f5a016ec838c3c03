//! Training loop - runs episodes, decays exploration, manages the session

use std::io::Write;
use std::thread;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use qflow_core::Config;

use crate::action::ActionCodec;
use crate::episode::{EpisodeOutcome, EpisodeRunner, EpisodeSettings, Termination};
use crate::learner::Learner;
use crate::policy::{EpsilonGreedy, ExplorationSchedule};
use crate::q_table::QTable;
use crate::simulation::{Simulation, SimulationConnector};
use crate::state::StateDiscretizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Played,
    /// Reset never produced a valid observation; the session was replaced
    Skipped,
}

/// Per-episode metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub run_id: Uuid,
    /// 1-based episode number
    pub episode: u32,
    pub status: EpisodeStatus,
    pub termination: Option<Termination>,
    pub total_reward: f64,
    pub steps: u64,
    pub updates: u64,
    /// Exploration rate after this episode's decay
    pub epsilon: f64,
    pub finished_at: DateTime<Utc>,
}

impl EpisodeReport {
    /// Append this report to `writer` as one line of JSON
    pub fn write_json_line<W: Write>(&self, writer: &mut W) -> qflow_core::Result<()> {
        let line = serde_json::to_string(self)?;
        writeln!(writer, "{line}")?;
        Ok(())
    }
}

/// Outcome of a full training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub run_id: Uuid,
    pub episodes_requested: u32,
    pub episodes_played: u32,
    pub episodes_skipped: u32,
    pub reconnects: u32,
    pub total_reward: f64,
    pub final_epsilon: f64,
    pub q_table: Vec<Vec<f64>>,
    pub reports: Vec<EpisodeReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

type ReportSink = Box<dyn FnMut(&EpisodeReport)>;

/// Owns the Q-table and exploration schedule for a training run
pub struct TrainingLoop {
    run_id: Uuid,
    config: Config,
    table: QTable,
    runner: EpisodeRunner,
    exploration: ExplorationSchedule,
    connector: Box<dyn SimulationConnector>,
    report_sink: Option<ReportSink>,
}

impl TrainingLoop {
    /// Build the learning components from `config`
    pub fn new(config: Config, connector: impl SimulationConnector + 'static) -> Result<Self> {
        config.validate().context("Invalid training configuration")?;

        let spaces = &config.spaces;
        let discretizer = StateDiscretizer::new(spaces.num_states);
        let codec = ActionCodec::new(spaces.action_base, spaces.action_step, spaces.num_actions);

        let policy = EpsilonGreedy::new(discretizer.clone(), codec.clone(), config.simulation.seed);
        let learner = Learner::new(config.learning.alpha, config.learning.gamma, discretizer, codec);
        let runner = EpisodeRunner::new(
            policy,
            learner,
            EpisodeSettings::from_config(&config.simulation),
        );

        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            episodes = config.learning.episodes,
            alpha = config.learning.alpha,
            gamma = config.learning.gamma,
            "Training loop initialized with {}x{} Q-table",
            spaces.num_states,
            spaces.num_actions
        );

        Ok(Self {
            run_id,
            table: QTable::new(spaces.num_states, spaces.num_actions),
            exploration: ExplorationSchedule::from_config(&config.learning),
            runner,
            config,
            connector: Box::new(connector),
            report_sink: None,
        })
    }

    /// Receive every episode report as soon as it is produced
    pub fn with_report_sink(mut self, sink: impl FnMut(&EpisodeReport) + 'static) -> Self {
        self.report_sink = Some(Box::new(sink));
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn epsilon(&self) -> f64 {
        self.exploration.epsilon()
    }

    /// Run all configured episodes and close the session.
    ///
    /// Only a failure to open the initial session is an error; failed resets
    /// skip the episode and force a reconnect.
    pub fn run(&mut self) -> Result<TrainingSummary> {
        let started_at = Utc::now();
        let episodes = self.config.learning.episodes;

        let mut session = Some(
            self.connector
                .connect(&self.config.simulation)
                .context("Failed to connect to simulation")?,
        );

        let mut reports = Vec::with_capacity(episodes as usize);
        let mut reconnects = 0;

        for episode in 1..=episodes {
            if session.is_none() {
                session = self.reconnect();
                if session.is_some() {
                    reconnects += 1;
                }
            }
            let Some(simulation) = session.as_mut() else {
                warn!(episode, "No simulation session, skipping episode");
                let report = self.skipped_report(episode);
                self.publish(&report);
                reports.push(report);
                continue;
            };

            let epsilon = self.exploration.epsilon();
            match self.runner.run(simulation.as_mut(), &mut self.table, epsilon) {
                EpisodeOutcome::Played(result) => {
                    let epsilon = self.exploration.decay();
                    info!(
                        episode,
                        steps = result.steps,
                        termination = ?result.termination,
                        "Episode {}/{} \t total reward: {:.2} \t epsilon: {:.2}",
                        episode,
                        episodes,
                        result.total_reward,
                        epsilon
                    );
                    let report = EpisodeReport {
                        run_id: self.run_id,
                        episode,
                        status: EpisodeStatus::Played,
                        termination: Some(result.termination),
                        total_reward: result.total_reward,
                        steps: result.steps,
                        updates: result.updates,
                        epsilon,
                        finished_at: Utc::now(),
                    };
                    self.publish(&report);
                    reports.push(report);

                    let cooldown = self.config.simulation.episode_cooldown();
                    if !cooldown.is_zero() && episode < episodes {
                        thread::sleep(cooldown);
                    }
                }
                EpisodeOutcome::Unusable { attempts } => {
                    warn!(
                        episode,
                        attempts, "Reset failed, skipping episode and reconnecting simulation"
                    );
                    let report = self.skipped_report(episode);
                    self.publish(&report);
                    reports.push(report);

                    if let Some(poisoned) = session.take() {
                        close_session(poisoned);
                    }
                    if let Some(fresh) = self.reconnect() {
                        reconnects += 1;
                        session = Some(fresh);
                    }
                }
            }
        }

        if let Some(simulation) = session.take() {
            close_session(simulation);
        }

        let episodes_played = reports
            .iter()
            .filter(|r| r.status == EpisodeStatus::Played)
            .count() as u32;
        let summary = TrainingSummary {
            run_id: self.run_id,
            episodes_requested: episodes,
            episodes_played,
            episodes_skipped: episodes - episodes_played,
            reconnects,
            total_reward: reports.iter().map(|r| r.total_reward).sum(),
            final_epsilon: self.exploration.epsilon(),
            q_table: self.table.rows(),
            reports,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            run_id = %summary.run_id,
            played = summary.episodes_played,
            skipped = summary.episodes_skipped,
            reconnects = summary.reconnects,
            "Training complete, final epsilon {:.4}",
            summary.final_epsilon
        );

        Ok(summary)
    }

    /// Open a fresh session with the same configuration
    fn reconnect(&mut self) -> Option<Box<dyn Simulation>> {
        match self.connector.connect(&self.config.simulation) {
            Ok(simulation) => {
                info!(endpoint = %self.config.simulation.endpoint, "Simulation session re-established");
                Some(simulation)
            }
            Err(e) => {
                error!(
                    endpoint = %self.config.simulation.endpoint,
                    "Reconnect failed, will retry before next episode: {}", e
                );
                None
            }
        }
    }

    fn skipped_report(&self, episode: u32) -> EpisodeReport {
        EpisodeReport {
            run_id: self.run_id,
            episode,
            status: EpisodeStatus::Skipped,
            termination: None,
            total_reward: 0.0,
            steps: 0,
            updates: 0,
            epsilon: self.exploration.epsilon(),
            finished_at: Utc::now(),
        }
    }

    fn publish(&mut self, report: &EpisodeReport) {
        if let Some(sink) = self.report_sink.as_mut() {
            sink(report);
        }
    }
}

fn close_session(mut simulation: Box<dyn Simulation>) {
    if let Err(e) = simulation.close() {
        warn!("Failed to close simulation session: {}", e);
    }
}
