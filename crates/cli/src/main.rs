mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use divvy_core::{CommandQueue, Executor, RunClock, RunReport, ShellExecutor};
use divvy_dispatch::{execute, run_worker, DivvyConfig, Transport, ZmqWorkerLink};

use crate::cli::{CliArgs, CliCommand, WorkerArgs};

#[tokio::main]
async fn main() -> ExitCode {
    // Wall-clock time covers the whole program, argument parsing included.
    let clock = RunClock::start();

    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let result = match args.command {
        Some(CliCommand::Worker(ref worker)) => run_worker_process(worker).await,
        None => run_coordinator(&args, clock).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr so command output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_coordinator(args: &CliArgs, clock: RunClock) -> Result<ExitCode> {
    let mut config = DivvyConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    args.apply_to(&mut config)?;
    config.validate().context("invalid configuration")?;
    init_tracing(config.verbose);

    let queue = CommandQueue::load(&args.files, config.limits)
        .context("failed to load commands")?;
    info!(
        n_cmds = queue.len(),
        files = args.files.len(),
        mode = %config.mode,
        "loaded commands"
    );

    let report = execute(&config, Arc::new(queue), &clock).await?;
    println!("Wall clock time: {:.2} sec", report.wall_clock_secs);

    if let Some(path) = &args.report {
        write_report(&report, path)?;
    }
    summarize(&report);

    Ok(ExitCode::from(report.exit_code() as u8))
}

fn write_report(report: &RunReport, path: &std::path::Path) -> Result<()> {
    let json = report.to_json_pretty().context("failed to encode run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write run report to {}", path.display()))?;
    debug!(path = %path.display(), "wrote run report");
    Ok(())
}

fn summarize(report: &RunReport) {
    if report.aborted {
        tracing::error!(
            dispatched = report.dispatched,
            total = report.total,
            failed = report.failed(),
            "run aborted on failed command"
        );
    } else if report.failed() > 0 {
        tracing::warn!(
            succeeded = report.succeeded,
            failed = report.failed(),
            "run finished with failed commands"
        );
    } else {
        info!(succeeded = report.succeeded, "run finished");
    }
}

async fn run_worker_process(args: &WorkerArgs) -> Result<ExitCode> {
    init_tracing(args.verbose());

    let transport: Transport = args
        .connect
        .parse()
        .context("invalid --connect endpoint")?;
    let mut link = ZmqWorkerLink::connect_with_retry(
        &transport,
        args.rank,
        Duration::from_secs(args.connect_timeout),
    )
    .await
    .with_context(|| format!("worker {} could not reach {}", args.rank, args.connect))?;

    let executor: Arc<dyn Executor> = Arc::new(ShellExecutor::new(&args.shell));
    let summary = run_worker(&mut link, executor)
        .await
        .with_context(|| format!("worker {} lost its coordinator", args.rank))?;
    debug!(
        rank = summary.rank,
        executed = summary.executed.len(),
        failed = summary.failed.len(),
        "worker exiting"
    );
    Ok(ExitCode::SUCCESS)
}
