use async_trait::async_trait;

use crate::error::DispatchError;
use crate::message::{Directive, Rank, Report};

/// The coordinator's end of the message links to every worker.
///
/// Sends are point-to-point by rank; receives take the next report from any
/// worker, in arrival order.
#[async_trait]
pub trait CoordinatorLink: Send {
    /// Ranks of all started workers, ascending.
    fn ranks(&self) -> Vec<Rank>;

    /// Deliver a directive to one worker.
    async fn send(&mut self, rank: Rank, directive: Directive) -> Result<(), DispatchError>;

    /// Receive the next report from any worker. Blocks until one arrives.
    async fn recv(&mut self) -> Result<Report, DispatchError>;
}

/// A worker's end of its link to the coordinator.
#[async_trait]
pub trait WorkerLink: Send {
    fn rank(&self) -> Rank;

    /// Receive the next directive. Blocks until one arrives.
    async fn recv(&mut self) -> Result<Directive, DispatchError>;

    async fn send(&mut self, report: Report) -> Result<(), DispatchError>;
}
