//! Message-passing scheduler: one coordinator, N worker processes.
//!
//! The coordinator owns the queue cursor and runs a pull-based protocol:
//!
//! 1. **Fill**: one command per worker, in increasing rank order.
//! 2. **Pull**: each completion signal from any worker is answered with the
//!    next pending command for that same worker.
//! 3. **Drain**: once the queue is exhausted (or the run is cancelled),
//!    each completion is answered with the termination sentinel instead.
//! 4. **Shutdown**: workers that never received a command get the sentinel.
//!
//! Transport is abstracted behind [`CoordinatorLink`](crate::CoordinatorLink)
//! and [`WorkerLink`](crate::WorkerLink): [`channel`] links run the protocol
//! in-process, [`zmq`] links run it between processes.

pub mod channel;
pub mod coordinator;
pub mod worker;
pub mod zmq;

pub use coordinator::Coordinator;
pub use worker::{run_worker, Worker, WorkerSummary};
