use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use divvy_core::{ErrorPolicy, QueueLimits, RunMode, DEFAULT_SHELL};

use crate::error::DispatchError;
use crate::local::resolve_threads;

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for one divvy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivvyConfig {
    /// Which scheduler runs the queue.
    #[serde(default = "default_mode")]
    pub mode: RunMode,

    /// Per-dispatch progress at info level.
    #[serde(default = "default_true")]
    pub verbose: bool,

    /// Abort the run on the first failed command.
    #[serde(default = "default_true")]
    pub exit_on_error: bool,

    /// Shell used as `<shell> -c <command>`.
    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub distributed: DistributedConfig,

    #[serde(default)]
    pub limits: QueueLimits,
}

fn default_mode() -> RunMode {
    RunMode::Distributed
}

fn default_true() -> bool {
    true
}

fn default_shell() -> String {
    DEFAULT_SHELL.into()
}

impl Default for DivvyConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            verbose: true,
            exit_on_error: true,
            shell: default_shell(),
            local: LocalConfig::default(),
            distributed: DistributedConfig::default(),
            limits: QueueLimits::default(),
        }
    }
}

impl DivvyConfig {
    pub fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy {
            exit_on_error: self.exit_on_error,
        }
    }

    /// Local pool size, falling back to available parallelism.
    pub fn resolved_threads(&self) -> usize {
        resolve_threads(self.local.threads.unwrap_or(0))
    }

    /// Distributed worker count, falling back to available parallelism.
    pub fn resolved_workers(&self) -> usize {
        self.distributed
            .workers
            .unwrap_or_else(|| resolve_threads(0))
    }

    pub fn register_timeout(&self) -> Duration {
        Duration::from_secs(self.distributed.register_timeout_secs)
    }
}

// ── Section configs ─────────────────────────────────────────────────

/// `[local]`: the shared-memory thread pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Pool size. Unset means one thread per available CPU.
    #[serde(default)]
    pub threads: Option<usize>,
}

/// `[distributed]`: coordinator socket and worker processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedConfig {
    /// Number of worker processes. Unset means one per available CPU.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Endpoint the coordinator binds (`tcp://host:port`, `ipc://name` or
    /// `ipc:///abs/path.sock`).
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Whether divvy starts its own workers.
    #[serde(default)]
    pub launch: LaunchMode,

    /// How long to wait for every worker to register.
    #[serde(default = "default_register_timeout_secs")]
    pub register_timeout_secs: u64,

    /// Worker executable; defaults to the running `divvy` binary.
    #[serde(default)]
    pub worker_program: Option<PathBuf>,
}

fn default_bind() -> String {
    "tcp://127.0.0.1:0".into()
}

fn default_register_timeout_secs() -> u64 {
    30
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            workers: None,
            bind: default_bind(),
            launch: LaunchMode::default(),
            register_timeout_secs: default_register_timeout_secs(),
            worker_program: None,
        }
    }
}

/// How distributed workers come into existence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Spawn worker processes on this host.
    #[default]
    Spawn,
    /// Wait for workers started elsewhere with `divvy worker`.
    External,
}

impl std::str::FromStr for LaunchMode {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spawn" => Ok(Self::Spawn),
            "external" => Ok(Self::External),
            other => Err(DispatchError::Config(format!(
                "invalid launch mode '{other}', expected 'spawn' or 'external'"
            ))),
        }
    }
}

impl std::fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn => write!(f, "spawn"),
            Self::External => write!(f, "external"),
        }
    }
}
