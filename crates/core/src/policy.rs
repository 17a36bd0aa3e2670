use serde::{Deserialize, Serialize};

/// What happens when a command fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPolicy {
    /// Stop dispatching and fail the whole run on the first failed command.
    pub exit_on_error: bool,
}

impl ErrorPolicy {
    pub fn exit_on_error() -> Self {
        Self {
            exit_on_error: true,
        }
    }

    pub fn keep_going() -> Self {
        Self {
            exit_on_error: false,
        }
    }
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::exit_on_error()
    }
}
