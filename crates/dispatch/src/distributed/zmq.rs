//! Links between processes over ZeroMQ ROUTER/DEALER sockets.
//!
//! The coordinator binds a ROUTER; each worker connects a DEALER and
//! announces its rank with a `Hello` report. The ROUTER learns the peer
//! identity from that first message and uses it to route directives.
//!
//! ## Framing (zeromq-rs 0.4)
//!
//! - DEALER sends: `[topic, body]`
//! - ROUTER receives: `[identity, topic, body]`
//! - ROUTER sends: `[identity, topic, body]`
//! - DEALER receives: `[topic, body]`

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket, ZmqMessage};

use crate::error::DispatchError;
use crate::message::{worker_ranks, Directive, Rank, Report, WireMessage, COORDINATOR_RANK};
use crate::traits::{CoordinatorLink, WorkerLink};
use crate::transport::Transport;

/// Pause between connection attempts while the coordinator is not up yet.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Strip leading empty delimiter frames and decode `[topic, body]`.
fn decode_frames<M: WireMessage>(frames: &[&[u8]]) -> Result<M, DispatchError> {
    let data_frames: Vec<&[u8]> = frames
        .iter()
        .copied()
        .skip_while(|f| f.is_empty())
        .collect();

    if data_frames.len() < 2 {
        return Err(DispatchError::Transport(format!(
            "expected [topic, body], got {} data frames",
            data_frames.len()
        )));
    }
    M::from_frames(data_frames[0], data_frames[1])
}

/// Coordinator side: a bound ROUTER socket plus the rank → identity table.
pub struct ZmqCoordinatorLink {
    socket: RouterSocket,
    endpoint: String,
    peers: BTreeMap<Rank, Vec<u8>>,
}

impl ZmqCoordinatorLink {
    /// Bind a ROUTER socket. A TCP port of 0 binds an ephemeral port;
    /// [`endpoint`](Self::endpoint) reports the one actually chosen.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, DispatchError> {
        transport.prepare_bind()?;

        let mut socket = RouterSocket::new();
        let bound = socket.bind(&transport.endpoint()).await?;
        let endpoint = bound.to_string();
        info!(endpoint = %endpoint, "coordinator listening");

        Ok(Self {
            socket,
            endpoint,
            peers: BTreeMap::new(),
        })
    }

    /// The resolved endpoint workers should connect to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Wait until `expected` workers with ranks `1..=expected` have said hello.
    ///
    /// Workers announcing a duplicate or out-of-range rank are sent the
    /// termination sentinel and otherwise ignored.
    pub async fn register(
        &mut self,
        expected: usize,
        timeout: Duration,
    ) -> Result<(), DispatchError> {
        match tokio::time::timeout(timeout, self.await_hellos(expected)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    registered = self.peers.len(),
                    expected, "timed out waiting for workers"
                );
                Err(DispatchError::Timeout(timeout))
            }
        }
    }

    async fn await_hellos(&mut self, expected: usize) -> Result<(), DispatchError> {
        while self.peers.len() < expected {
            let (identity, report) = self.recv_report().await?;
            match report {
                Report::Hello { rank }
                    if worker_ranks(expected).contains(&rank) && !self.peers.contains_key(&rank) =>
                {
                    self.peers.insert(rank, identity);
                    info!(rank, registered = self.peers.len(), expected, "worker registered");
                }
                Report::Hello { rank } => {
                    warn!(rank, expected, "rejecting worker with duplicate or out-of-range rank");
                    self.send_to(identity, &Directive::Terminate).await?;
                }
                other => {
                    return Err(DispatchError::Protocol(format!(
                        "expected hello during registration, got {} from rank {}",
                        other.topic(),
                        other.rank()
                    )));
                }
            }
        }
        Ok(())
    }

    async fn recv_report(&mut self) -> Result<(Vec<u8>, Report), DispatchError> {
        let zmq_msg = self.socket.recv().await?;
        let frames: Vec<&[u8]> = zmq_msg.iter().map(|f| &f[..]).collect();
        if frames.len() < 2 {
            return Err(DispatchError::Transport(format!(
                "expected at least 2 frames from ROUTER, got {}",
                frames.len()
            )));
        }

        let identity = frames[0].to_vec();
        let report = decode_frames(&frames[1..])?;
        Ok((identity, report))
    }

    async fn send_to(
        &mut self,
        identity: Vec<u8>,
        directive: &Directive,
    ) -> Result<(), DispatchError> {
        let (topic, body) = directive.to_frames()?;
        let mut zmq_msg = ZmqMessage::from(identity);
        zmq_msg.push_back(topic.as_bytes().to_vec().into());
        zmq_msg.push_back(body.into());
        self.socket.send(zmq_msg).await?;
        Ok(())
    }
}

#[async_trait]
impl CoordinatorLink for ZmqCoordinatorLink {
    fn ranks(&self) -> Vec<Rank> {
        self.peers.keys().copied().collect()
    }

    async fn send(&mut self, rank: Rank, directive: Directive) -> Result<(), DispatchError> {
        let identity = self.peers.get(&rank).cloned().ok_or_else(|| {
            DispatchError::Protocol(format!("no worker registered as rank {rank}"))
        })?;
        debug!(rank, topic = directive.topic(), "sending directive");
        self.send_to(identity, &directive).await
    }

    async fn recv(&mut self) -> Result<Report, DispatchError> {
        loop {
            let (identity, report) = self.recv_report().await?;
            let rank = report.rank();
            match self.peers.get(&rank) {
                Some(known) if *known == identity => return Ok(report),
                _ => {
                    warn!(rank, topic = report.topic(), "dropping report from unregistered peer");
                }
            }
        }
    }
}

/// Worker side: a DEALER socket connected to the coordinator.
pub struct ZmqWorkerLink {
    socket: DealerSocket,
    rank: Rank,
}

impl ZmqWorkerLink {
    /// Connect and announce `rank` to the coordinator.
    #[instrument(skip_all, fields(endpoint = %transport, rank = rank))]
    pub async fn connect(transport: &Transport, rank: Rank) -> Result<Self, DispatchError> {
        if rank == COORDINATOR_RANK {
            return Err(DispatchError::Config(format!(
                "rank {COORDINATOR_RANK} is reserved for the coordinator"
            )));
        }
        let mut socket = DealerSocket::new();
        socket.connect(&transport.endpoint()).await?;
        debug!("connected DEALER socket");

        let mut link = Self { socket, rank };
        link.send(Report::Hello { rank }).await?;
        Ok(link)
    }

    /// [`connect`](Self::connect), retrying until `timeout` elapses.
    ///
    /// Externally started workers may come up before the coordinator binds.
    pub async fn connect_with_retry(
        transport: &Transport,
        rank: Rank,
        timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let deadline = Instant::now() + timeout;
        loop {
            let attempt = tokio::time::timeout_at(deadline, Self::connect(transport, rank)).await;
            match attempt {
                Ok(Ok(link)) => return Ok(link),
                Ok(Err(e)) if Instant::now() + CONNECT_RETRY_INTERVAL < deadline => {
                    debug!(error = %e, "coordinator not reachable yet, retrying");
                    tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "giving up on coordinator");
                    return Err(DispatchError::Timeout(timeout));
                }
                Err(_) => return Err(DispatchError::Timeout(timeout)),
            }
        }
    }
}

#[async_trait]
impl WorkerLink for ZmqWorkerLink {
    fn rank(&self) -> Rank {
        self.rank
    }

    async fn recv(&mut self) -> Result<Directive, DispatchError> {
        let zmq_msg = self.socket.recv().await?;
        let frames: Vec<&[u8]> = zmq_msg.iter().map(|f| &f[..]).collect();
        decode_frames(&frames)
    }

    async fn send(&mut self, report: Report) -> Result<(), DispatchError> {
        let (topic, body) = report.to_frames()?;
        let mut zmq_msg = ZmqMessage::from(topic);
        zmq_msg.push_back(body.into());
        self.socket.send(zmq_msg).await?;
        Ok(())
    }
}
