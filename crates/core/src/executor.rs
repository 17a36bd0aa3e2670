//! Process executor: runs one command string to completion.
//!
//! The executor is the unit of work both schedulers dispatch. It has no
//! retry logic and no timeout; a hung child blocks its caller until it exits.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Shell used when none is configured.
pub const DEFAULT_SHELL: &str = "bash";

/// Why a command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The child exited with a non-zero status.
    ExitCode(i32),
    /// The child was terminated by a signal.
    Signal(i32),
    /// The shell could not be started or waited on.
    Spawn(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::ExitCode(code) => write!(f, "exit status {code}"),
            FailureReason::Signal(sig) => write!(f, "terminated by signal {sig}"),
            FailureReason::Spawn(msg) => write!(f, "failed to run shell: {msg}"),
        }
    }
}

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure(FailureReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Outcome::Success => None,
            Outcome::Failure(reason) => Some(reason),
        }
    }
}

/// Runs a single command string and reports whether it succeeded.
///
/// Implementations are shared by every worker thread in local mode, so they
/// must be `Send + Sync`.
pub trait Executor: Send + Sync {
    fn run(&self, command: &str) -> Outcome;
}

/// Blanket implementation so `Arc<dyn Executor>` can be used directly.
impl<T: Executor + ?Sized> Executor for Arc<T> {
    fn run(&self, command: &str) -> Outcome {
        (**self).run(command)
    }
}

/// Executes commands through `<shell> -c <command>`.
///
/// The child inherits stdin, stdout and stderr, so output from concurrent
/// workers may interleave.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: PathBuf,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl Executor for ShellExecutor {
    fn run(&self, command: &str) -> Outcome {
        debug!(shell = %self.shell.display(), command, "spawning command");
        match std::process::Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .status()
        {
            Ok(status) => outcome_from_status(status),
            Err(e) => Outcome::Failure(FailureReason::Spawn(e.to_string())),
        }
    }
}

fn outcome_from_status(status: ExitStatus) -> Outcome {
    if status.success() {
        return Outcome::Success;
    }
    if let Some(code) = status.code() {
        return Outcome::Failure(FailureReason::ExitCode(code));
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return Outcome::Failure(FailureReason::Signal(sig));
        }
    }

    Outcome::Failure(FailureReason::Spawn(format!("unrecognised exit status: {status}")))
}
