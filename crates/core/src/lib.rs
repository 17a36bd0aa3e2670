pub mod command;
pub mod error;
pub mod executor;
pub mod policy;
pub mod queue;
pub mod report;

pub use command::{parse_line, Command};
pub use error::LoadError;
pub use executor::{Executor, FailureReason, Outcome, ShellExecutor, DEFAULT_SHELL};
pub use policy::ErrorPolicy;
pub use queue::{CommandQueue, QueueLimits};
pub use report::{CommandFailure, DispatchRecord, RunClock, RunMode, RunReport};
