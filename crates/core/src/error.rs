use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building a [`CommandQueue`](crate::CommandQueue).
///
/// Every variant is fatal: no partial queue is ever handed to a scheduler.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("problem opening file for reading: {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("problem reading {path}, line {line}: {source}")]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("command length too large: file {path}, line {line} ({len} bytes, max {max})")]
    CommandTooLong {
        path: PathBuf,
        line: usize,
        len: usize,
        max: usize,
    },

    #[error("command is not valid UTF-8: file {path}, line {line}")]
    InvalidUtf8 { path: PathBuf, line: usize },

    #[error("too many commands in command files (max {max})")]
    TooManyCommands { max: usize },

    #[error("no command files given")]
    NoInput,
}
