use std::sync::Arc;

use tracing::{debug, error, info};

use divvy_core::{Executor, Outcome};

use crate::error::DispatchError;
use crate::message::{Assignment, Directive, Rank, Report};
use crate::traits::WorkerLink;

/// What one worker did before it was terminated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub rank: Rank,
    /// Queue indices executed, in the order received.
    pub executed: Vec<usize>,
    /// Subset of `executed` that failed.
    pub failed: Vec<usize>,
}

/// Receive loop of a single worker: run each assigned command, report back,
/// stop on the termination sentinel.
#[derive(Clone)]
pub struct Worker {
    executor: Arc<dyn Executor>,
}

impl Worker {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    pub async fn run<L>(&self, link: &mut L) -> Result<WorkerSummary, DispatchError>
    where
        L: WorkerLink + ?Sized,
    {
        let rank = link.rank();
        let mut summary = WorkerSummary {
            rank,
            ..Default::default()
        };
        debug!(rank, "worker waiting for commands");

        loop {
            let Assignment {
                index,
                command,
                exit_on_error,
            } = match link.recv().await? {
                Directive::Assign(assignment) => assignment,
                Directive::Terminate => {
                    info!(
                        rank,
                        executed = summary.executed.len(),
                        failed = summary.failed.len(),
                        "worker terminated"
                    );
                    return Ok(summary);
                }
            };

            debug!(rank, index, command = %command, "running command");
            let executor = Arc::clone(&self.executor);
            let outcome = tokio::task::spawn_blocking(move || executor.run(&command)).await?;

            summary.executed.push(index);
            if let Outcome::Failure(reason) = &outcome {
                summary.failed.push(index);
                if exit_on_error {
                    error!(rank, index, %reason, "command failed, run will abort");
                } else {
                    error!(rank, index, %reason, "command failed, continuing");
                }
            }

            link.send(Report::Completed {
                rank,
                index,
                outcome,
            })
            .await?;
        }
    }
}

/// Run one worker loop over `link` until terminated.
pub async fn run_worker<L>(
    link: &mut L,
    executor: Arc<dyn Executor>,
) -> Result<WorkerSummary, DispatchError>
where
    L: WorkerLink + ?Sized,
{
    Worker::new(executor).run(link).await
}
