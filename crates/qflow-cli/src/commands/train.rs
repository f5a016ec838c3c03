//! Training command - runs the agent against the surrogate OLSR simulation

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use qflow_core::Config;
use qflow_rl::{EpisodeReport, SurrogateConfig, SurrogateConnector, TrainingLoop, TrainingSummary};

#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// Number of episodes (overrides learning.episodes)
    #[arg(short, long)]
    pub episodes: Option<u32>,

    /// Random seed (overrides simulation.seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Append one JSON line per episode to this file (overrides logging.report_path)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Pause between episodes in milliseconds (overrides simulation.episode_cooldown_ms)
    #[arg(long)]
    pub cooldown_ms: Option<u64>,

    /// Steps per surrogate episode
    #[arg(long, default_value_t = 20)]
    pub steps: u64,

    /// Probability that a surrogate reset fails
    #[arg(long, default_value_t = 0.0)]
    pub reset_failure_rate: f64,

    /// Probability that a surrogate step returns a malformed observation
    #[arg(long, default_value_t = 0.0)]
    pub malformed_rate: f64,

    /// Print the full training summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl TrainArgs {
    /// Fold command-line overrides into the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(episodes) = self.episodes {
            config.learning.episodes = episodes;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if let Some(report) = &self.report {
            config.logging.report_path = Some(report.clone());
        }
        if let Some(cooldown_ms) = self.cooldown_ms {
            config.simulation.episode_cooldown_ms = cooldown_ms;
        }
    }

    fn surrogate(&self) -> SurrogateConfig {
        SurrogateConfig {
            episode_steps: self.steps,
            reset_failure_rate: self.reset_failure_rate,
            malformed_rate: self.malformed_rate,
            ..Default::default()
        }
    }
}

pub fn run(args: TrainArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config);

    let report_path = config.logging.report_path.clone();
    let connector = SurrogateConnector::new(args.surrogate());
    let mut training = TrainingLoop::new(config, connector)?;

    if let Some(path) = report_path {
        let file = open_report(&path)?;
        info!("Writing episode reports to {}", path.display());
        training = training.with_report_sink(report_writer(file));
    }

    let summary = training.run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn open_report(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open report file {}", path.display()))
}

/// Append each report as a JSON line; write failures are logged, not fatal
fn report_writer(mut file: File) -> impl FnMut(&EpisodeReport) {
    move |report| {
        if let Err(e) = report.write_json_line(&mut file) {
            warn!(episode = report.episode, "Failed to write episode report: {}", e);
        }
    }
}

fn print_summary(summary: &TrainingSummary) {
    println!("Training Summary");
    println!("================\n");
    println!("Run:         {}", summary.run_id);
    println!(
        "Episodes:    {} played, {} skipped ({} requested)",
        summary.episodes_played, summary.episodes_skipped, summary.episodes_requested
    );
    println!("Reconnects:  {}", summary.reconnects);
    println!("Reward:      {:.2}", summary.total_reward);
    println!("Epsilon:     {:.4}", summary.final_epsilon);
    println!("\nQ-table:");
    for (state, row) in summary.q_table.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:7.3}")).collect();
        println!("  s{state}: {}", cells.join(" "));
    }
}
