//! Shared-memory scheduler: one process, a fixed pool of worker threads.
//!
//! Threads pull work one command at a time from a [`ClaimCursor`], so fast
//! threads pick up more commands than slow ones. A failure under the
//! exit-on-error policy closes the cursor: commands already running finish,
//! nothing new is claimed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::{debug, error, info, warn};

use divvy_core::{CommandQueue, ErrorPolicy, Executor, Outcome, RunMode, RunReport};

use crate::error::DispatchError;

/// Atomic claim-and-advance cursor over `[0, len)`.
///
/// Every successful [`claim`](Self::claim) returns a distinct index. Once
/// [`close`](Self::close) returns, no further claim succeeds.
#[derive(Debug)]
pub struct ClaimCursor {
    next: AtomicUsize,
    len: usize,
    closed: AtomicBool,
}

impl ClaimCursor {
    pub fn new(len: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            len,
            closed: AtomicBool::new(false),
        }
    }

    /// Claim the next unassigned index, or `None` when exhausted or closed.
    pub fn claim(&self) -> Option<usize> {
        let len = self.len;
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < len).then_some(n + 1)
            })
            .ok()
    }

    /// Stop handing out indices. Returns how many were claimed before closing.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        self.next.swap(self.len, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Runs a queue on a fixed-size thread pool.
#[derive(Debug, Clone)]
pub struct LocalScheduler {
    threads: usize,
    policy: ErrorPolicy,
    verbose: bool,
}

impl LocalScheduler {
    /// `threads == 0` means one thread per available CPU.
    pub fn new(threads: usize, policy: ErrorPolicy) -> Self {
        Self {
            threads: resolve_threads(threads),
            policy,
            verbose: false,
        }
    }

    /// Log every dispatch at info level instead of debug.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Execute every command in `queue` once. Blocks until the pool drains.
    pub fn run(
        &self,
        queue: &CommandQueue,
        executor: &dyn Executor,
    ) -> Result<RunReport, DispatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|slot| format!("divvy-worker-{slot}"))
            .build()?;

        info!(
            threads = self.threads,
            n_cmds = queue.len(),
            exit_on_error = self.policy.exit_on_error,
            "starting local scheduler"
        );

        let cursor = ClaimCursor::new(queue.len());
        let report = Mutex::new(RunReport::new(RunMode::Local, queue.len()));

        pool.scope(|scope| {
            for slot in 0..self.threads {
                let cursor = &cursor;
                let report = &report;
                scope.spawn(move |_| self.work(slot, queue, executor, cursor, report));
            }
        });

        let report = report
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        info!(
            dispatched = report.dispatched,
            succeeded = report.succeeded,
            failed = report.failed(),
            aborted = report.aborted,
            "local scheduler finished"
        );
        Ok(report)
    }

    /// Claim-one-run-one loop for a single pool thread.
    fn work(
        &self,
        slot: usize,
        queue: &CommandQueue,
        executor: &dyn Executor,
        cursor: &ClaimCursor,
        report: &Mutex<RunReport>,
    ) {
        while let Some(index) = cursor.claim() {
            let command = &queue[index];
            lock(report).record_dispatch(index, slot);
            if self.verbose {
                info!(n_cmds = queue.len(), index, worker = slot, "dispatch");
            } else {
                debug!(n_cmds = queue.len(), index, worker = slot, "dispatch");
            }

            let outcome = executor.run(command.as_str());
            if let Outcome::Failure(reason) = &outcome {
                error!(index, command = %command, %reason, "command failed");
                if self.policy.exit_on_error && !cursor.is_closed() {
                    let claimed = cursor.close();
                    warn!(index, claimed, "exit on error: no further commands will start");
                    lock(report).aborted = true;
                }
            }
            lock(report).record_outcome(index, command.as_str(), outcome);
        }
        debug!(worker = slot, "worker idle, queue exhausted");
    }
}

fn lock(report: &Mutex<RunReport>) -> std::sync::MutexGuard<'_, RunReport> {
    report.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Resolve a configured thread count, `0` meaning available parallelism.
pub fn resolve_threads(threads: usize) -> usize {
    if threads == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    } else {
        threads
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn claims_are_distinct_and_bounded() {
        let cursor = Arc::new(ClaimCursor::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cursor = Arc::clone(&cursor);
                thread::spawn(move || {
                    let mut mine = Vec::new();
                    while let Some(i) = cursor.claim() {
                        mine.push(i);
                    }
                    mine
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for i in h.join().unwrap() {
                assert!(seen.insert(i), "index {i} claimed twice");
            }
        }
        assert_eq!(seen.len(), 1000);
        assert!(seen.iter().all(|&i| i < 1000));
    }

    #[test]
    fn closed_cursor_hands_out_nothing() {
        let cursor = ClaimCursor::new(5);
        assert_eq!(cursor.claim(), Some(0));
        assert_eq!(cursor.claim(), Some(1));
        assert_eq!(cursor.close(), 2);
        assert!(cursor.is_closed());
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn empty_cursor() {
        let cursor = ClaimCursor::new(0);
        assert!(cursor.is_empty());
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn zero_threads_resolves_to_available_parallelism() {
        assert!(resolve_threads(0) > 0);
        assert_eq!(resolve_threads(3), 3);
        assert_eq!(LocalScheduler::new(5, ErrorPolicy::default()).threads(), 5);
    }
}
