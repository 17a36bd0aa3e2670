//! Shared fixtures for the dispatch integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use divvy_core::{Command, CommandQueue, Executor, FailureReason, Outcome};

/// Build a queue from literal command lines.
pub fn queue(lines: &[&str]) -> CommandQueue {
    CommandQueue::from_commands(lines.iter().filter_map(|l| Command::from_line(l)).collect())
}

/// `cmd-0`, `cmd-1`, ... `cmd-{n-1}`.
pub fn numbered(n: usize) -> CommandQueue {
    let lines: Vec<String> = (0..n).map(|i| format!("cmd-{i}")).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    queue(&refs)
}

/// Records every command it is asked to run instead of spawning a shell.
///
/// Commands starting with `fail` exit 1; commands starting with `slow`
/// sleep for the configured delay first.
#[derive(Default)]
pub struct RecordingExecutor {
    seen: Mutex<Vec<String>>,
    slow: Duration,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slow(slow: Duration) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            slow,
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Executor for RecordingExecutor {
    fn run(&self, command: &str) -> Outcome {
        self.seen.lock().unwrap().push(command.to_string());
        if command.starts_with("slow") {
            std::thread::sleep(self.slow);
        }
        if command.starts_with("fail") {
            Outcome::Failure(FailureReason::ExitCode(1))
        } else {
            Outcome::Success
        }
    }
}
