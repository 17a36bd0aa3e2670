use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use divvy_core::{CommandQueue, ErrorPolicy, Outcome, RunMode, RunReport};

use crate::error::DispatchError;
use crate::message::{Assignment, Directive, Rank, Report};
use crate::traits::CoordinatorLink;

/// Drives the fill / pull / drain / shutdown protocol over a [`CoordinatorLink`].
#[derive(Debug, Clone)]
pub struct Coordinator {
    policy: ErrorPolicy,
    verbose: bool,
}

/// Coordinator-owned pool state for one run.
struct PoolState {
    /// Next unassigned queue index.
    cursor: usize,
    /// rank → index of the command it is running.
    in_flight: HashMap<Rank, usize>,
    /// Set once an exit-on-error failure has been seen.
    cancelled: bool,
    report: RunReport,
}

impl Coordinator {
    pub fn new(policy: ErrorPolicy) -> Self {
        Self {
            policy,
            verbose: false,
        }
    }

    /// Log every dispatch at info level instead of debug.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run `queue` to completion on the workers behind `link`.
    ///
    /// Returns once every started worker has been sent the termination
    /// sentinel. Completion signals that do not match an outstanding
    /// assignment are a protocol error.
    pub async fn run<L>(
        &self,
        queue: &CommandQueue,
        link: &mut L,
    ) -> Result<RunReport, DispatchError>
    where
        L: CoordinatorLink + ?Sized,
    {
        let ranks = link.ranks();
        if ranks.is_empty() {
            return Err(DispatchError::Config(
                "must use more than one process for distributed mode".into(),
            ));
        }

        let n_cmds = queue.len();
        if ranks.len() > n_cmds {
            warn!(
                processes = ranks.len() + 1,
                required = n_cmds + 1,
                "more processes started than required"
            );
        }

        info!(
            workers = ranks.len(),
            n_cmds,
            exit_on_error = self.policy.exit_on_error,
            "starting coordinator"
        );

        let mut state = PoolState {
            cursor: 0,
            in_flight: HashMap::with_capacity(ranks.len()),
            cancelled: false,
            report: RunReport::new(RunMode::Distributed, n_cmds),
        };

        // Fill phase: one command per rank, lowest rank first.
        let mut never_assigned = Vec::new();
        for &rank in &ranks {
            if state.cursor < n_cmds {
                self.dispatch(link, queue, &mut state, rank, "fill").await?;
            } else {
                never_assigned.push(rank);
            }
        }

        // Pull loop, then drain: every completion frees exactly one rank.
        while !state.in_flight.is_empty() {
            let (rank, index, outcome) = match link.recv().await? {
                Report::Completed {
                    rank,
                    index,
                    outcome,
                } => (rank, index, outcome),
                Report::Hello { rank } => {
                    warn!(rank, "ignoring registration received mid-run");
                    continue;
                }
            };

            match state.in_flight.remove(&rank) {
                Some(assigned) if assigned == index => {}
                Some(assigned) => {
                    return Err(DispatchError::Protocol(format!(
                        "rank {rank} reported index {index} but was assigned {assigned}"
                    )));
                }
                None => {
                    return Err(DispatchError::Protocol(format!(
                        "completion from rank {rank} which holds no assignment"
                    )));
                }
            }

            let command = queue[index].as_str();
            if let Outcome::Failure(reason) = &outcome {
                error!(index, rank, command, %reason, "command failed");
                if self.policy.exit_on_error && !state.cancelled {
                    warn!(
                        index,
                        in_flight = state.in_flight.len(),
                        "exit on error: cancelling run, waiting for in-flight commands"
                    );
                    state.cancelled = true;
                    state.report.aborted = true;
                }
            }
            state.report.record_outcome(index, command, outcome);

            if !state.cancelled && state.cursor < n_cmds {
                self.dispatch(link, queue, &mut state, rank, "pull").await?;
            } else {
                self.terminate(link, &mut state, rank, "drain").await?;
            }
        }

        // Shutdown: ranks that were started but never given work.
        for rank in never_assigned {
            self.terminate(link, &mut state, rank, "shutdown").await?;
        }

        let report = state.report;
        info!(
            dispatched = report.dispatched,
            succeeded = report.succeeded,
            failed = report.failed(),
            aborted = report.aborted,
            "coordinator finished"
        );
        Ok(report)
    }

    async fn dispatch<L>(
        &self,
        link: &mut L,
        queue: &CommandQueue,
        state: &mut PoolState,
        rank: Rank,
        phase: &'static str,
    ) -> Result<(), DispatchError>
    where
        L: CoordinatorLink + ?Sized,
    {
        let index = state.cursor;
        if self.verbose {
            info!(phase, n_cmds = queue.len(), index, rank, "dispatch");
        } else {
            debug!(phase, n_cmds = queue.len(), index, rank, "dispatch");
        }

        let assignment = Assignment {
            index,
            command: queue[index].as_str().to_string(),
            exit_on_error: self.policy.exit_on_error,
        };
        link.send(rank, Directive::Assign(assignment)).await?;

        state.cursor += 1;
        state.in_flight.insert(rank, index);
        state.report.record_dispatch(index, rank);
        Ok(())
    }

    async fn terminate<L>(
        &self,
        link: &mut L,
        state: &mut PoolState,
        rank: Rank,
        phase: &'static str,
    ) -> Result<(), DispatchError>
    where
        L: CoordinatorLink + ?Sized,
    {
        if self.verbose {
            info!(phase, rank, "terminate");
        } else {
            debug!(phase, rank, "terminate");
        }
        link.send(rank, Directive::Terminate).await?;
        state.report.terminated.push(rank);
        Ok(())
    }
}
