use serde::{Deserialize, Serialize};

/// Marker that starts a comment in a command file.
pub const COMMENT_MARKER: char = '#';

/// One shell command read from a command file.
///
/// A command has no identity of its own; schedulers refer to it by its
/// position in the [`CommandQueue`](crate::CommandQueue).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(String);

impl Command {
    /// Build a command from a raw line, applying the command-file rules.
    ///
    /// Returns `None` for blank and comment-only lines.
    pub fn from_line(line: &str) -> Option<Self> {
        parse_line(line).map(|s| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the command in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Drop everything from the first `#` onwards.
pub fn strip_comment(line: &str) -> &str {
    match line.find(COMMENT_MARKER) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Apply the command-file line rules: strip the comment, trim surrounding
/// whitespace (including a trailing newline), and discard empty results.
pub fn parse_line(line: &str) -> Option<&str> {
    let trimmed = strip_comment(line).trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
