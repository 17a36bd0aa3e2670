//! Top-level run glue: pick a scheduler from the config and drive it.

use std::sync::Arc;

use tracing::{info, warn};

use divvy_core::{CommandQueue, RunClock, RunMode, RunReport, ShellExecutor};

use crate::config::{DivvyConfig, LaunchMode};
use crate::distributed::zmq::ZmqCoordinatorLink;
use crate::distributed::Coordinator;
use crate::error::DispatchError;
use crate::launcher::{LaunchOptions, Launcher, SHUTDOWN_GRACE};
use crate::local::LocalScheduler;
use crate::transport::Transport;

/// Run every command in `queue` under `config` and return the final report,
/// stamped with the wall-clock time elapsed since `clock` started.
pub async fn execute(
    config: &DivvyConfig,
    queue: Arc<CommandQueue>,
    clock: &RunClock,
) -> Result<RunReport, DispatchError> {
    config.validate()?;

    let mut report = match config.mode {
        RunMode::Local => run_local(config, queue).await?,
        RunMode::Distributed => run_distributed(config, &queue).await?,
    };
    report.finish(clock);
    Ok(report)
}

async fn run_local(
    config: &DivvyConfig,
    queue: Arc<CommandQueue>,
) -> Result<RunReport, DispatchError> {
    let scheduler = LocalScheduler::new(config.resolved_threads(), config.error_policy())
        .verbose(config.verbose);
    let executor = ShellExecutor::new(&config.shell);
    tokio::task::spawn_blocking(move || scheduler.run(&queue, &executor)).await?
}

async fn run_distributed(
    config: &DivvyConfig,
    queue: &CommandQueue,
) -> Result<RunReport, DispatchError> {
    let workers = config.resolved_workers();
    let transport: Transport = config.distributed.bind.parse()?;
    let mut link = ZmqCoordinatorLink::bind(&transport).await?;

    let mut launcher = match config.distributed.launch {
        LaunchMode::Spawn => {
            let options = match &config.distributed.worker_program {
                Some(program) => LaunchOptions {
                    program: program.clone(),
                    shell: config.shell.clone(),
                    verbose: config.verbose,
                },
                None => LaunchOptions::current_exe(config.shell.clone(), config.verbose)?,
            };
            Some(Launcher::spawn(&options, link.endpoint(), workers)?)
        }
        LaunchMode::External => {
            info!(
                endpoint = link.endpoint(),
                workers, "waiting for externally started workers"
            );
            None
        }
    };

    let coordinator = Coordinator::new(config.error_policy()).verbose(config.verbose);
    let result = async {
        link.register(workers, config.register_timeout()).await?;
        coordinator.run(queue, &mut link).await
    }
    .await;

    match result {
        Ok(report) => {
            if let Some(launcher) = launcher.as_mut() {
                launcher.wait_all().await?;
            }
            Ok(report)
        }
        Err(e) => {
            if let Some(launcher) = launcher.as_mut() {
                warn!(error = %e, "fatal coordinator error, stopping workers");
                launcher.kill_all(SHUTDOWN_GRACE).await;
            }
            Err(e)
        }
    }
}
