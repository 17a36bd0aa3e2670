use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{Command, COMMENT_MARKER};
use crate::error::LoadError;

/// Path that stands for standard input in the list of command files.
pub const STDIN_PATH: &str = "-";

const DEFAULT_MAX_COMMANDS: usize = 4_194_304;
const DEFAULT_MAX_COMMAND_LEN: usize = 16_384;

/// Upper bounds enforced while loading command files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLimits {
    /// Maximum number of commands across all files.
    #[serde(default = "default_max_commands")]
    pub max_commands: usize,

    /// Maximum length in bytes of a line's content before its comment.
    #[serde(default = "default_max_command_len")]
    pub max_command_len: usize,
}

fn default_max_commands() -> usize {
    DEFAULT_MAX_COMMANDS
}

fn default_max_command_len() -> usize {
    DEFAULT_MAX_COMMAND_LEN
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_commands: DEFAULT_MAX_COMMANDS,
            max_command_len: DEFAULT_MAX_COMMAND_LEN,
        }
    }
}

/// Ordered, immutable list of commands addressed by index.
///
/// Built once before scheduling starts. Schedulers never remove entries;
/// progress is tracked by a cursor owned by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    pub fn from_commands(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    /// Load every file in argument order and concatenate their commands.
    ///
    /// The path `-` reads standard input.
    pub fn load<P: AsRef<Path>>(paths: &[P], limits: QueueLimits) -> Result<Self, LoadError> {
        if paths.is_empty() {
            return Err(LoadError::NoInput);
        }

        let mut commands = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let before = commands.len();
            if path == Path::new(STDIN_PATH) {
                let stdin = std::io::stdin();
                read_commands(stdin.lock(), path, limits, &mut commands)?;
            } else {
                let file = File::open(path).map_err(|source| LoadError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
                read_commands(BufReader::new(file), path, limits, &mut commands)?;
            }
            debug!(
                path = %path.display(),
                commands = commands.len() - before,
                "loaded command file"
            );
        }

        Ok(Self { commands })
    }

    /// Build a queue from a single reader. `source` is only used in errors.
    pub fn from_reader<R: BufRead>(
        reader: R,
        source: &Path,
        limits: QueueLimits,
    ) -> Result<Self, LoadError> {
        let mut commands = Vec::new();
        read_commands(reader, source, limits, &mut commands)?;
        Ok(Self { commands })
    }

    pub fn get(&self, index: usize) -> Option<&Command> {
        self.commands.get(index)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }
}

impl std::ops::Index<usize> for CommandQueue {
    type Output = Command;

    fn index(&self, index: usize) -> &Command {
        &self.commands[index]
    }
}

fn read_commands<R: BufRead>(
    mut reader: R,
    source: &Path,
    limits: QueueLimits,
    commands: &mut Vec<Command>,
) -> Result<(), LoadError> {
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source_err| LoadError::Read {
                path: source.to_path_buf(),
                line: line_no + 1,
                source: source_err,
            })?;
        if read == 0 {
            return Ok(());
        }
        line_no += 1;

        while matches!(buf.last(), Some(&(b'\n' | b'\r'))) {
            buf.pop();
        }

        // Measured on the raw bytes, before any decoding.
        let body_len = buf
            .iter()
            .position(|&b| b == COMMENT_MARKER as u8)
            .unwrap_or(buf.len());
        if body_len > limits.max_command_len {
            return Err(LoadError::CommandTooLong {
                path: source.to_path_buf(),
                line: line_no,
                len: body_len,
                max: limits.max_command_len,
            });
        }

        let line = std::str::from_utf8(&buf).map_err(|_| LoadError::InvalidUtf8 {
            path: source.to_path_buf(),
            line: line_no,
        })?;

        if let Some(command) = Command::from_line(line) {
            if commands.len() >= limits.max_commands {
                return Err(LoadError::TooManyCommands {
                    max: limits.max_commands,
                });
            }
            commands.push(command);
        }
    }
}
