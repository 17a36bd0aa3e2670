//! Typed messages exchanged between the coordinator and its workers.
//!
//! The protocol is a closed set: the coordinator sends [`Directive`]s, the
//! workers send [`Report`]s. On the wire each message travels as two frames,
//! `[topic, body]`, where the body is the MessagePack encoding of the message
//! and the topic names its kind.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use divvy_core::Outcome;

use crate::error::DispatchError;

/// Stable worker id. Workers are numbered `1..=N`; rank 0 is the coordinator.
pub type Rank = usize;

pub const COORDINATOR_RANK: Rank = 0;

/// Ranks of a pool of `count` workers, numbered up from the coordinator.
pub fn worker_ranks(count: usize) -> std::ops::RangeInclusive<Rank> {
    COORDINATOR_RANK + 1..=COORDINATOR_RANK + count
}

pub mod topics {
    pub const ASSIGN: &str = "divvy.assign";
    pub const TERMINATE: &str = "divvy.terminate";
    pub const HELLO: &str = "divvy.hello";
    pub const COMPLETED: &str = "divvy.completed";
}

/// One command handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Position of the command in the coordinator's queue.
    pub index: usize,
    pub command: String,
    /// Error policy in force for this run.
    pub exit_on_error: bool,
}

/// Coordinator → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    Assign(Assignment),
    /// Termination sentinel: the worker leaves its receive loop.
    Terminate,
}

/// Worker → coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Report {
    /// Sent once on connect so the coordinator can route by rank.
    Hello { rank: Rank },
    /// Completion signal: the worker finished `index` and is ready for more.
    Completed {
        rank: Rank,
        index: usize,
        outcome: Outcome,
    },
}

impl Report {
    pub fn rank(&self) -> Rank {
        match self {
            Report::Hello { rank } | Report::Completed { rank, .. } => *rank,
        }
    }
}

/// A message that can be framed as `[topic, body]`.
pub trait WireMessage: Serialize + DeserializeOwned {
    fn topic(&self) -> &'static str;

    /// Encode into the topic and MessagePack body frames.
    fn to_frames(&self) -> Result<(&'static str, Vec<u8>), DispatchError> {
        Ok((self.topic(), rmp_serde::to_vec(self)?))
    }

    /// Decode a body and check it against the topic frame it arrived with.
    fn from_frames(topic: &[u8], body: &[u8]) -> Result<Self, DispatchError> {
        let message: Self = rmp_serde::from_slice(body)?;
        if message.topic().as_bytes() != topic {
            return Err(DispatchError::Protocol(format!(
                "topic '{}' does not match a {} body",
                String::from_utf8_lossy(topic),
                message.topic()
            )));
        }
        Ok(message)
    }
}

impl WireMessage for Directive {
    fn topic(&self) -> &'static str {
        match self {
            Directive::Assign(_) => topics::ASSIGN,
            Directive::Terminate => topics::TERMINATE,
        }
    }
}

impl WireMessage for Report {
    fn topic(&self) -> &'static str {
        match self {
            Report::Hello { .. } => topics::HELLO,
            Report::Completed { .. } => topics::COMPLETED,
        }
    }
}
