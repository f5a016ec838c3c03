//! Bounded sleep-and-recheck wait

use std::thread;
use std::time::{Duration, Instant};

use qflow_core::{QFlowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The condition cleared before the deadline
    Ready,
    /// The deadline passed while the condition still held
    GaveUp,
}

impl WaitOutcome {
    pub fn gave_up(self) -> bool {
        self == WaitOutcome::GaveUp
    }

    /// `Timeout` naming what was still pending when `deadline` ran out
    pub fn into_result(self, deadline: Duration, pending: &str) -> Result<()> {
        match self {
            WaitOutcome::Ready => Ok(()),
            WaitOutcome::GaveUp => Err(QFlowError::Timeout(format!(
                "{pending} after {deadline:?}"
            ))),
        }
    }
}

/// Poll `busy` every `poll_interval` until it returns false or `deadline` elapses.
///
/// Blocks the calling thread. `busy` is checked at least once.
pub fn wait_while<F>(deadline: Duration, poll_interval: Duration, mut busy: F) -> WaitOutcome
where
    F: FnMut() -> bool,
{
    let started = Instant::now();
    while busy() {
        if started.elapsed() >= deadline {
            return WaitOutcome::GaveUp;
        }
        thread::sleep(poll_interval);
    }
    WaitOutcome::Ready
}
