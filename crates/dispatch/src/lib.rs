pub mod config;
pub mod distributed;
pub mod error;
pub mod launcher;
pub mod local;
pub mod message;
pub mod run;
pub mod traits;
pub mod transport;

pub use config::{DistributedConfig, DivvyConfig, LaunchMode, LocalConfig};
pub use distributed::channel::{link_pair, ChannelCoordinatorLink, ChannelWorkerLink};
pub use distributed::zmq::{ZmqCoordinatorLink, ZmqWorkerLink};
pub use distributed::{run_worker, Coordinator, Worker, WorkerSummary};
pub use error::DispatchError;
pub use launcher::{LaunchOptions, Launcher, SHUTDOWN_GRACE};
pub use local::{resolve_threads, ClaimCursor, LocalScheduler};
pub use message::{
    topics, worker_ranks, Assignment, Directive, Rank, Report, WireMessage, COORDINATOR_RANK,
};
pub use run::execute;
pub use traits::{CoordinatorLink, WorkerLink};
pub use transport::Transport;
