use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use divvy_core::{RunMode, DEFAULT_SHELL};
use divvy_dispatch::DivvyConfig;

/// Run a list of shell commands in parallel.
///
/// Each non-blank line of each FILE is one command (`#` starts a comment).
/// Commands run on a local thread pool (`--omp`) or on worker processes fed
/// by a coordinator (`--mpi`, the default).
#[derive(Parser, Debug)]
#[command(
    name = "divvy",
    version,
    about = "Distribute shell commands across parallel workers",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<CliCommand>,

    /// Command files, one shell command per line (`-` reads stdin)
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Abort the run on the first failed command (default)
    #[arg(long = "exit_on_error", overrides_with = "no_exit_on_error")]
    pub exit_on_error: bool,

    /// Keep going after failed commands
    #[arg(long = "no-exit_on_error", overrides_with = "exit_on_error")]
    pub no_exit_on_error: bool,

    /// Run on a local thread pool
    #[arg(long = "omp", visible_alias = "local", overrides_with = "mpi")]
    pub omp: bool,

    /// Run on a coordinator plus worker processes (default)
    #[arg(long = "mpi", visible_alias = "distributed", overrides_with = "omp")]
    pub mpi: bool,

    /// Local pool size (default: available parallelism)
    #[arg(long = "n_threads", value_name = "N")]
    pub n_threads: Option<usize>,

    /// Log every dispatch (default)
    #[arg(long, overrides_with = "no_verbose")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(long = "no-verbose", overrides_with = "verbose")]
    pub no_verbose: bool,

    /// Number of worker processes in distributed mode
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Endpoint the coordinator binds, e.g. tcp://0.0.0.0:5570
    #[arg(long, value_name = "ENDPOINT")]
    pub bind: Option<String>,

    /// Spawn workers locally or wait for external ones
    #[arg(long, value_name = "MODE", value_parser = ["spawn", "external"])]
    pub launch: Option<String>,

    /// Seconds to wait for every worker to register
    #[arg(long = "register-timeout", value_name = "SECS")]
    pub register_timeout: Option<u64>,

    /// Shell used to run each command as `<shell> -c <command>`
    #[arg(long, value_name = "PATH")]
    pub shell: Option<String>,

    /// TOML config file
    #[arg(long, value_name = "PATH", env = "DIVVY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Maximum number of commands across all files
    #[arg(long = "max-commands", value_name = "N")]
    pub max_commands: Option<usize>,

    /// Maximum length in bytes of a single command
    #[arg(long = "max-command-length", value_name = "BYTES")]
    pub max_command_length: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run one distributed worker (started by the coordinator, or by hand
    /// on another host with `--launch external`)
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Coordinator endpoint, e.g. tcp://10.0.0.1:5570
    #[arg(long, value_name = "ENDPOINT")]
    pub connect: String,

    /// This worker's rank, 1..=N
    #[arg(long)]
    pub rank: usize,

    /// Shell used to run each command
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SHELL)]
    pub shell: String,

    /// Seconds to keep retrying the coordinator connection
    #[arg(long = "connect-timeout", value_name = "SECS", default_value = "30")]
    pub connect_timeout: u64,

    #[arg(long, overrides_with = "no_verbose")]
    pub verbose: bool,

    #[arg(long = "no-verbose", overrides_with = "verbose")]
    pub no_verbose: bool,
}

impl WorkerArgs {
    pub fn verbose(&self) -> bool {
        !self.no_verbose
    }
}

/// `Some(true)` / `Some(false)` for an explicit `--x` / `--no-x`, else `None`.
fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl CliArgs {
    pub fn exit_on_error_flag(&self) -> Option<bool> {
        flag_pair(self.exit_on_error, self.no_exit_on_error)
    }

    pub fn verbose_flag(&self) -> Option<bool> {
        flag_pair(self.verbose, self.no_verbose)
    }

    pub fn mode_flag(&self) -> Option<RunMode> {
        match (self.omp, self.mpi) {
            (true, _) => Some(RunMode::Local),
            (_, true) => Some(RunMode::Distributed),
            _ => None,
        }
    }

    /// Layer explicitly given flags over a loaded config.
    pub fn apply_to(&self, config: &mut DivvyConfig) -> Result<()> {
        if let Some(mode) = self.mode_flag() {
            config.mode = mode;
        }
        if let Some(exit_on_error) = self.exit_on_error_flag() {
            config.exit_on_error = exit_on_error;
        }
        if let Some(verbose) = self.verbose_flag() {
            config.verbose = verbose;
        }
        if let Some(threads) = self.n_threads {
            config.local.threads = Some(threads);
        }
        if let Some(workers) = self.workers {
            config.distributed.workers = Some(workers);
        }
        if let Some(bind) = &self.bind {
            config.distributed.bind = bind.clone();
        }
        if let Some(launch) = &self.launch {
            config.distributed.launch = launch.parse().context("invalid --launch")?;
        }
        if let Some(secs) = self.register_timeout {
            config.distributed.register_timeout_secs = secs;
        }
        if let Some(shell) = &self.shell {
            config.shell = shell.clone();
        }
        if let Some(max) = self.max_commands {
            config.limits.max_commands = max;
        }
        if let Some(max) = self.max_command_length {
            config.limits.max_command_len = max;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;
    use divvy_dispatch::LaunchMode;

    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("divvy").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn files_are_required() {
        let err = CliArgs::try_parse_from(["divvy"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn defaults_leave_config_untouched() {
        let args = parse(&["jobs.txt"]);
        let mut config = DivvyConfig::default();
        args.apply_to(&mut config).unwrap();
        assert_eq!(config.mode, RunMode::Distributed);
        assert!(config.exit_on_error);
        assert!(config.verbose);
        assert_eq!(args.files, vec![PathBuf::from("jobs.txt")]);
    }

    #[test]
    fn last_flag_of_a_pair_wins() {
        let args = parse(&["--exit_on_error", "--no-exit_on_error", "a"]);
        assert_eq!(args.exit_on_error_flag(), Some(false));

        let args = parse(&["--no-exit_on_error", "--exit_on_error", "a"]);
        assert_eq!(args.exit_on_error_flag(), Some(true));

        let args = parse(&["--mpi", "--omp", "a"]);
        assert_eq!(args.mode_flag(), Some(RunMode::Local));

        let args = parse(&["--no-verbose", "a"]);
        assert_eq!(args.verbose_flag(), Some(false));
    }

    #[test]
    fn mode_aliases() {
        assert_eq!(parse(&["--local", "a"]).mode_flag(), Some(RunMode::Local));
        assert_eq!(
            parse(&["--distributed", "a"]).mode_flag(),
            Some(RunMode::Distributed)
        );
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "--omp",
            "--n_threads",
            "6",
            "--no-exit_on_error",
            "--workers",
            "3",
            "--bind",
            "ipc://job",
            "--launch",
            "external",
            "--register-timeout",
            "5",
            "--shell",
            "sh",
            "--max-commands",
            "10",
            "--max-command-length",
            "64",
            "a.txt",
            "b.txt",
        ]);
        let mut config = DivvyConfig::default();
        args.apply_to(&mut config).unwrap();

        assert_eq!(config.mode, RunMode::Local);
        assert_eq!(config.local.threads, Some(6));
        assert!(!config.exit_on_error);
        assert_eq!(config.distributed.workers, Some(3));
        assert_eq!(config.distributed.bind, "ipc://job");
        assert_eq!(config.distributed.launch, LaunchMode::External);
        assert_eq!(config.distributed.register_timeout_secs, 5);
        assert_eq!(config.shell, "sh");
        assert_eq!(config.limits.max_commands, 10);
        assert_eq!(config.limits.max_command_len, 64);
        assert_eq!(args.files.len(), 2);
    }

    #[test]
    fn unknown_launch_mode_is_rejected_by_clap() {
        let err = CliArgs::try_parse_from(["divvy", "--launch", "ssh", "a"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn worker_subcommand() {
        let args = parse(&[
            "worker",
            "--connect",
            "tcp://127.0.0.1:5570",
            "--rank",
            "2",
            "--no-verbose",
        ]);
        match args.command {
            Some(CliCommand::Worker(worker)) => {
                assert_eq!(worker.connect, "tcp://127.0.0.1:5570");
                assert_eq!(worker.rank, 2);
                assert_eq!(worker.shell, DEFAULT_SHELL);
                assert!(!worker.verbose());
            }
            other => panic!("expected worker subcommand, got {other:?}"),
        }
    }

    #[test]
    fn help_and_version_are_not_failures() {
        let err = CliArgs::try_parse_from(["divvy", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert!(!err.use_stderr());

        let err = CliArgs::try_parse_from(["divvy", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
        assert!(!err.use_stderr());
    }
}
