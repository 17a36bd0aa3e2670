//! Run configuration: `divvy.toml`, `DIVVY_*` environment overrides, and
//! validation. Command-line flags are applied on top by the binary.

mod loading;
mod types;
mod validation;


pub use types::{DistributedConfig, DivvyConfig, LaunchMode, LocalConfig};
