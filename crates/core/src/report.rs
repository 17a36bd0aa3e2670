use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::{FailureReason, Outcome};

/// Which scheduler drove a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Thread pool inside one process.
    Local,
    /// Coordinator process plus worker processes.
    Distributed,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Local => write!(f, "local"),
            RunMode::Distributed => write!(f, "distributed"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "omp" => Ok(RunMode::Local),
            "distributed" | "mpi" => Ok(RunMode::Distributed),
            other => Err(format!(
                "invalid mode '{other}', expected 'local' or 'distributed'"
            )),
        }
    }
}

/// Wall-clock reference captured once at the start of a run.
///
/// Passed explicitly to whatever reports the final duration.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl RunClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// A command that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub index: usize,
    pub command: String,
    pub reason: FailureReason,
}

/// One dispatch: command `index` went to `worker`.
///
/// `worker` is a thread slot in local mode and a rank in distributed mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub index: usize,
    pub worker: usize,
}

/// Summary of a finished run, produced by either scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: RunMode,
    /// Number of commands in the queue.
    pub total: usize,
    /// Number of commands handed to a worker.
    pub dispatched: usize,
    pub succeeded: usize,
    /// Failed commands in the order their completions were seen.
    pub failures: Vec<CommandFailure>,
    /// Set when the exit-on-error policy stopped dispatch.
    pub aborted: bool,
    pub dispatches: Vec<DispatchRecord>,
    /// Ranks sent the termination sentinel, in send order. Empty in local mode.
    pub terminated: Vec<usize>,
    pub started_at: Option<DateTime<Utc>>,
    pub wall_clock_secs: f64,
}

impl RunReport {
    pub fn new(mode: RunMode, total: usize) -> Self {
        Self {
            mode,
            total,
            dispatched: 0,
            succeeded: 0,
            failures: Vec::new(),
            aborted: false,
            dispatches: Vec::new(),
            terminated: Vec::new(),
            started_at: None,
            wall_clock_secs: 0.0,
        }
    }

    pub fn record_dispatch(&mut self, index: usize, worker: usize) {
        self.dispatched += 1;
        self.dispatches.push(DispatchRecord { index, worker });
    }

    pub fn record_outcome(&mut self, index: usize, command: &str, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Failure(reason) => self.failures.push(CommandFailure {
                index,
                command: command.to_string(),
                reason,
            }),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Commands that ran to completion, successfully or not.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    /// Process exit code for this run: 1 when aborted, otherwise 0.
    pub fn exit_code(&self) -> i32 {
        if self.aborted {
            1
        } else {
            0
        }
    }

    /// Stamp the wall-clock duration measured from `clock`.
    pub fn finish(&mut self, clock: &RunClock) {
        self.started_at = Some(clock.started_at());
        self.wall_clock_secs = clock.elapsed().as_secs_f64();
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
