//! In-process links over tokio channels.
//!
//! Used to run the coordinator and its workers as tasks in one runtime,
//! with the same protocol the ZeroMQ links carry between processes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DispatchError;
use crate::message::{worker_ranks, Directive, Rank, Report};
use crate::traits::{CoordinatorLink, WorkerLink};

/// Per-link buffer. A worker never has more than two directives pending.
const CHANNEL_CAPACITY: usize = 16;

pub struct ChannelCoordinatorLink {
    directives: BTreeMap<Rank, mpsc::Sender<Directive>>,
    reports: mpsc::Receiver<Report>,
}

pub struct ChannelWorkerLink {
    rank: Rank,
    directives: mpsc::Receiver<Directive>,
    reports: mpsc::Sender<Report>,
}

/// Build a coordinator link wired to `workers` worker links, ranks `1..=workers`.
pub fn link_pair(workers: usize) -> (ChannelCoordinatorLink, Vec<ChannelWorkerLink>) {
    let (report_tx, report_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let mut directives = BTreeMap::new();
    let mut worker_links = Vec::with_capacity(workers);

    for rank in worker_ranks(workers) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        directives.insert(rank, tx);
        worker_links.push(ChannelWorkerLink {
            rank,
            directives: rx,
            reports: report_tx.clone(),
        });
    }

    (
        ChannelCoordinatorLink {
            directives,
            reports: report_rx,
        },
        worker_links,
    )
}

#[async_trait]
impl CoordinatorLink for ChannelCoordinatorLink {
    fn ranks(&self) -> Vec<Rank> {
        self.directives.keys().copied().collect()
    }

    async fn send(&mut self, rank: Rank, directive: Directive) -> Result<(), DispatchError> {
        let tx = self
            .directives
            .get(&rank)
            .ok_or_else(|| DispatchError::Protocol(format!("no worker with rank {rank}")))?;
        tx.send(directive)
            .await
            .map_err(|_| DispatchError::Transport(format!("worker {rank} link closed")))
    }

    async fn recv(&mut self) -> Result<Report, DispatchError> {
        self.reports
            .recv()
            .await
            .ok_or_else(|| DispatchError::Transport("all worker links closed".into()))
    }
}

#[async_trait]
impl WorkerLink for ChannelWorkerLink {
    fn rank(&self) -> Rank {
        self.rank
    }

    async fn recv(&mut self) -> Result<Directive, DispatchError> {
        self.directives
            .recv()
            .await
            .ok_or_else(|| DispatchError::Transport("coordinator link closed".into()))
    }

    async fn send(&mut self, report: Report) -> Result<(), DispatchError> {
        self.reports
            .send(report)
            .await
            .map_err(|_| DispatchError::Transport("coordinator link closed".into()))
    }
}
