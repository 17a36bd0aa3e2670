//! End-to-end tests against the built `divvy` binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn divvy() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_divvy"));
    cmd.env_remove("RUST_LOG")
        .env_remove("DIVVY_CONFIG")
        .env_remove("DIVVY_MODE")
        .env_remove("DIVVY_THREADS")
        .env_remove("DIVVY_WORKERS")
        .env_remove("DIVVY_BIND")
        .env_remove("DIVVY_LAUNCH")
        .env_remove("DIVVY_SHELL");
    cmd
}

fn write_commands(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn touch_lines(dir: &TempDir, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("touch {}/out-{i}", dir.path().display()))
        .collect()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn local_mode_runs_every_command() {
    let dir = tempfile::tempdir().unwrap();
    let mut lines = vec!["# build outputs".to_string(), String::new()];
    lines.extend(touch_lines(&dir, 8));
    let file = write_commands(dir.path(), "jobs.txt", &lines);

    let output = divvy()
        .args(["--omp", "--n_threads", "3", "--shell", "sh"])
        .arg(&file)
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Wall clock time:"));
    for i in 0..8 {
        assert!(dir.path().join(format!("out-{i}")).exists(), "out-{i}");
    }
}

#[test]
fn multiple_files_are_concatenated() {
    let dir = tempfile::tempdir().unwrap();
    let lines = touch_lines(&dir, 4);
    let a = write_commands(dir.path(), "a.txt", &lines[..2]);
    let b = write_commands(dir.path(), "b.txt", &lines[2..]);
    let report = dir.path().join("report.json");

    let output = divvy()
        .args(["--local", "--shell", "sh", "--no-verbose", "--report"])
        .arg(&report)
        .arg(&a)
        .arg(&b)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["mode"], "local");
    assert_eq!(json["total"], 4);
    assert_eq!(json["succeeded"], 4);
    assert_eq!(json["aborted"], false);
}

#[test]
fn exit_on_error_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_commands(
        dir.path(),
        "jobs.txt",
        &["false".into(), "true".into(), "true".into()],
    );

    let output = divvy()
        .args(["--omp", "--n_threads", "1", "--shell", "sh"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn keep_going_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let mut lines = vec!["false".to_string()];
    lines.extend(touch_lines(&dir, 2));
    let file = write_commands(dir.path(), "jobs.txt", &lines);

    let output = divvy()
        .args(["--omp", "--no-exit_on_error", "--shell", "sh"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert!(dir.path().join("out-0").exists());
    assert!(dir.path().join("out-1").exists());
}

#[test]
fn commands_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = divvy()
        .args(["--omp", "--shell", "sh", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    {
        let mut stdin = child.stdin.take().unwrap();
        writeln!(stdin, "{}", touch_lines(&dir, 1)[0]).unwrap();
    }
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(dir.path().join("out-0").exists());
}

#[test]
fn missing_file_is_fatal() {
    let output = divvy()
        .args(["--omp", "/nonexistent/divvy/jobs.txt"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ERROR:"));
}

#[test]
fn oversized_command_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_commands(dir.path(), "jobs.txt", &["echo 0123456789".into()]);
    let output = divvy()
        .args(["--omp", "--max-command-length", "8"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ERROR:"));
}

#[test]
fn non_utf8_command_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("jobs.txt");
    let out = dir.path().join("out-0");
    let mut bytes = format!("touch {}\n", out.display()).into_bytes();
    bytes.extend_from_slice(b"cat caf\xe9.txt\n");
    std::fs::write(&file, bytes).unwrap();

    let output = divvy().args(["--omp", "--shell", "sh"]).arg(&file).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("not valid UTF-8"), "{}", stderr(&output));
    assert!(!out.exists());
}

#[test]
fn too_many_commands_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_commands(dir.path(), "jobs.txt", &touch_lines(&dir, 3));
    let output = divvy()
        .args(["--omp", "--max-commands", "2"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(!dir.path().join("out-0").exists());
}

#[test]
fn bad_flag_exits_one_help_and_version_exit_zero() {
    assert_eq!(divvy().arg("--bogus").output().unwrap().status.code(), Some(1));
    assert_eq!(divvy().arg("--help").output().unwrap().status.code(), Some(0));
    assert_eq!(divvy().arg("--version").output().unwrap().status.code(), Some(0));
}

#[test]
fn distributed_with_zero_workers_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_commands(dir.path(), "jobs.txt", &["true".into()]);
    let output = divvy()
        .args(["--mpi", "--workers", "0"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("more than one process"));
}

#[test]
fn distributed_mode_spawns_workers() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_commands(dir.path(), "jobs.txt", &touch_lines(&dir, 6));
    let report = dir.path().join("report.json");

    let output = divvy()
        .args(["--mpi", "--workers", "3", "--shell", "sh", "--report"])
        .arg(&report)
        .arg(&file)
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Wall clock time:"));
    for i in 0..6 {
        assert!(dir.path().join(format!("out-{i}")).exists(), "out-{i}");
    }

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["mode"], "distributed");
    assert_eq!(json["dispatched"], 6);
    assert_eq!(json["terminated"].as_array().unwrap().len(), 3);
}

#[test]
fn distributed_excess_workers_warn() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_commands(dir.path(), "jobs.txt", &touch_lines(&dir, 1));

    let output = divvy()
        .args(["--mpi", "--workers", "3", "--shell", "sh", "--no-verbose"])
        .arg(&file)
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stderr(&output).contains("more processes started than required"));
    assert!(dir.path().join("out-0").exists());
}

#[test]
fn distributed_exit_on_error_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let mut lines = vec!["exit 7".to_string()];
    lines.extend(touch_lines(&dir, 1));
    let file = write_commands(dir.path(), "jobs.txt", &lines);

    let output = divvy()
        .args(["--mpi", "--workers", "1", "--shell", "sh"])
        .arg(&file)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    // Single worker: the failure is seen before the next dispatch.
    assert!(!dir.path().join("out-0").exists());
}
