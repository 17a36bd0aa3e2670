use divvy_core::RunMode;

use super::types::DivvyConfig;
use crate::error::DispatchError;
use crate::transport::Transport;

impl DivvyConfig {
    /// Reject configurations no scheduler can run.
    pub fn validate(&self) -> Result<(), DispatchError> {
        self.validate_pool_sizes()?;
        self.validate_bind()?;
        self.validate_register_timeout()?;
        self.validate_limits()?;
        self.validate_shell()?;
        Ok(())
    }

    fn validate_pool_sizes(&self) -> Result<(), DispatchError> {
        if self.local.threads == Some(0) {
            return Err(DispatchError::Config(
                "local thread count must be at least 1".into(),
            ));
        }
        if self.mode == RunMode::Distributed && self.distributed.workers == Some(0) {
            return Err(DispatchError::Config(
                "must use more than one process for distributed mode".into(),
            ));
        }
        Ok(())
    }

    fn validate_bind(&self) -> Result<(), DispatchError> {
        self.distributed.bind.parse::<Transport>().map(|_| ())
    }

    fn validate_register_timeout(&self) -> Result<(), DispatchError> {
        if self.distributed.register_timeout_secs == 0 {
            return Err(DispatchError::Config(
                "register_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_limits(&self) -> Result<(), DispatchError> {
        if self.limits.max_commands == 0 || self.limits.max_command_len == 0 {
            return Err(DispatchError::Config(format!(
                "limits must be non-zero (max_commands = {}, max_command_len = {})",
                self.limits.max_commands, self.limits.max_command_len
            )));
        }
        Ok(())
    }

    fn validate_shell(&self) -> Result<(), DispatchError> {
        if self.shell.trim().is_empty() {
            return Err(DispatchError::Config("shell must not be empty".into()));
        }
        Ok(())
    }
}
