//! Spawns and supervises local worker processes for distributed mode.
//!
//! Each worker is the `divvy` binary itself, re-invoked as
//! `divvy worker --connect <endpoint> --rank <r> --shell <shell>`.
//! Worker stdout/stderr are inherited so command output reaches the terminal
//! unchanged.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::message::{worker_ranks, Rank};

/// Default time workers get to exit after SIGTERM before they are killed.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How to invoke a worker process.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// The `divvy` executable.
    pub program: PathBuf,
    pub shell: String,
    pub verbose: bool,
}

impl LaunchOptions {
    /// Launch workers from the currently running executable.
    pub fn current_exe(shell: impl Into<String>, verbose: bool) -> Result<Self, DispatchError> {
        Ok(Self {
            program: std::env::current_exe()?,
            shell: shell.into(),
            verbose,
        })
    }

    /// Command-line arguments for the worker with `rank`.
    pub fn worker_args(&self, endpoint: &str, rank: Rank) -> Vec<String> {
        vec![
            "worker".into(),
            "--connect".into(),
            endpoint.into(),
            "--rank".into(),
            rank.to_string(),
            "--shell".into(),
            self.shell.clone(),
            if self.verbose {
                "--verbose".into()
            } else {
                "--no-verbose".into()
            },
        ]
    }
}

struct ManagedWorker {
    rank: Rank,
    child: Child,
}

/// Owns the spawned worker processes. Dropping it kills any still running.
pub struct Launcher {
    workers: Vec<ManagedWorker>,
}

impl Launcher {
    /// Start ranks `1..=count`, each told to connect to `endpoint`.
    ///
    /// If any spawn fails, workers already started are killed on drop.
    pub fn spawn(
        options: &LaunchOptions,
        endpoint: &str,
        count: usize,
    ) -> Result<Self, DispatchError> {
        let mut workers = Vec::with_capacity(count);
        for rank in worker_ranks(count) {
            let child = Command::new(&options.program)
                .args(options.worker_args(endpoint, rank))
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .spawn()?;
            debug!(rank, pid = child.id(), "spawned worker");
            workers.push(ManagedWorker { rank, child });
        }
        info!(
            workers = count,
            program = %options.program.display(),
            endpoint,
            "launched worker processes"
        );
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to exit on its own, i.e. after termination.
    pub async fn wait_all(&mut self) -> Result<Vec<(Rank, ExitStatus)>, DispatchError> {
        let mut statuses = Vec::with_capacity(self.workers.len());
        for managed in self.workers.iter_mut() {
            let status = managed.child.wait().await?;
            if !status.success() {
                warn!(rank = managed.rank, %status, "worker exited abnormally");
            }
            statuses.push((managed.rank, status));
        }
        debug!(workers = statuses.len(), "all workers exited");
        Ok(statuses)
    }

    /// Stop every worker: SIGTERM now, SIGKILL for any still running once
    /// `grace` has passed. Returns how many had to be force-killed.
    pub async fn kill_all(&mut self, grace: Duration) -> usize {
        for managed in &mut self.workers {
            request_stop(managed);
        }

        let deadline = Instant::now() + grace;
        let mut forced = 0;
        for managed in &mut self.workers {
            match tokio::time::timeout_at(deadline, managed.child.wait()).await {
                Ok(Ok(status)) => debug!(rank = managed.rank, %status, "worker stopped"),
                Ok(Err(e)) => warn!(rank = managed.rank, error = %e, "could not reap worker"),
                Err(_) => {
                    warn!(rank = managed.rank, ?grace, "worker still running, killing");
                    if let Err(e) = managed.child.kill().await {
                        warn!(rank = managed.rank, error = %e, "kill failed");
                    }
                    forced += 1;
                }
            }
        }
        info!(workers = self.workers.len(), forced, "workers stopped");
        forced
    }
}

/// Ask a worker to exit: SIGTERM on Unix, a hard kill elsewhere.
fn request_stop(managed: &mut ManagedWorker) {
    let Some(pid) = managed.child.id() else {
        return;
    };
    #[cfg(unix)]
    let sent = std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success());
    #[cfg(not(unix))]
    let sent = managed.child.start_kill().map(|()| true);

    match sent {
        Ok(true) => debug!(rank = managed.rank, pid, "sent stop signal"),
        Ok(false) => debug!(rank = managed.rank, pid, "worker already gone"),
        Err(e) => warn!(rank = managed.rank, pid, error = %e, "could not signal worker"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(verbose: bool) -> LaunchOptions {
        LaunchOptions {
            program: PathBuf::from("/usr/local/bin/divvy"),
            shell: "bash".into(),
            verbose,
        }
    }

    #[test]
    fn worker_args_carry_endpoint_rank_and_shell() {
        let args = options(true).worker_args("tcp://10.0.0.1:5570", 3);
        assert_eq!(
            args,
            vec![
                "worker",
                "--connect",
                "tcp://10.0.0.1:5570",
                "--rank",
                "3",
                "--shell",
                "bash",
                "--verbose"
            ]
        );
    }

    #[test]
    fn quiet_workers_get_no_verbose() {
        let args = options(false).worker_args("ipc:///tmp/divvy/x.sock", 1);
        assert_eq!(args.last().map(String::as_str), Some("--no-verbose"));
    }

    #[tokio::test]
    async fn wait_all_collects_exit_status() {
        // `true` ignores its arguments and exits 0.
        let opts = LaunchOptions {
            program: PathBuf::from("true"),
            shell: "sh".into(),
            verbose: false,
        };
        let mut launcher = Launcher::spawn(&opts, "tcp://127.0.0.1:1", 2).unwrap();
        assert_eq!(launcher.len(), 2);
        let statuses = launcher.wait_all().await.unwrap();
        let ranks: Vec<_> = statuses.iter().map(|(r, _)| *r).collect();
        assert_eq!(ranks, vec![1, 2]);
        assert!(statuses.iter().all(|(_, s)| s.success()));
    }

    fn shell_workers(script: &str, count: usize) -> Launcher {
        let workers = worker_ranks(count)
            .map(|rank| ManagedWorker {
                rank,
                child: Command::new("sh")
                    .args(["-c", script])
                    .kill_on_drop(true)
                    .spawn()
                    .unwrap(),
            })
            .collect();
        Launcher { workers }
    }

    #[tokio::test]
    async fn kill_all_stops_workers_that_honor_sigterm() {
        let mut launcher = shell_workers("sleep 30", 2);
        let forced = launcher.kill_all(SHUTDOWN_GRACE).await;
        assert_eq!(forced, 0);
        for managed in launcher.workers.iter_mut() {
            assert!(managed.child.try_wait().unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn kill_all_force_kills_after_grace_when_sigterm_is_ignored() {
        let mut launcher = shell_workers("trap '' TERM; while :; do sleep 1; done", 2);
        // Let the shells install their trap before the signal arrives.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let started = Instant::now();
        let forced = launcher.kill_all(Duration::from_millis(200)).await;
        assert_eq!(forced, 2);
        assert!(started.elapsed() < SHUTDOWN_GRACE);
        for managed in launcher.workers.iter_mut() {
            assert!(managed.child.try_wait().unwrap().is_some());
        }
    }
}
