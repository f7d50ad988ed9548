// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod supervisor;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::config::Workspace;
use crate::errors::WillowcalError;
use crate::exec::is_working_copy;
use crate::orchestrator::{Orchestrator, ProgressEvent};
use crate::supervisor::{Supervisor, SupervisorOptions};
use crate::types::ServiceState;

/// How often `run` checks whether any service is still alive.
const LIVENESS_POLL: Duration = Duration::from_millis(500);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and workspace resolution
/// - the orchestrator (`init`, and missing clones for `run`)
/// - the supervisor and log printing (`run`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.command.config();
    let cfg = load_and_validate(config_path)?;
    let workspace = Workspace::from_config(&cfg)?;

    if args.command.dry_run() {
        print_dry_run(&cfg, &workspace);
        return Ok(());
    }

    tokio::fs::create_dir_all(workspace.root())
        .await
        .with_context(|| format!("creating workspace dir {}", workspace.root().display()))?;

    // Ctrl-C cancels everything in flight.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("interrupt received; shutting down");
            cancel.cancel();
        });
    }

    match args.command {
        Command::Init { .. } => run_init(&cfg, &workspace, cancel).await,
        Command::Run { .. } => run_services(&cfg, workspace, cancel).await,
    }
}

async fn run_init(cfg: &ConfigFile, workspace: &Workspace, cancel: CancellationToken) -> Result<()> {
    let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressEvent>(256);
    let printer = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            println!("{}", report::format_progress(&event));
        }
    });

    let orchestrator = Orchestrator::with_system_backends(workspace.root(), &cfg.engine)
        .with_cancellation(cancel)
        .with_progress(progress_tx);

    let state = orchestrator.execute(workspace.repositories().to_vec()).await;

    // Closes the progress channel so the printer drains and exits.
    drop(orchestrator);
    if let Err(e) = printer.await {
        debug!(error = %e, "progress printer ended abnormally");
    }

    report::print_summary(&state, cfg.engine.max_retries);

    if state.failure_count > 0 {
        return Err(WillowcalError::InitFailed {
            failed: state.failure_count,
            total: state.total_jobs,
        }
        .into());
    }
    Ok(())
}

async fn run_services(cfg: &ConfigFile, workspace: Workspace, cancel: CancellationToken) -> Result<()> {
    if workspace.services().is_empty() {
        info!("no services configured; nothing to run");
        return Ok(());
    }

    let mut missing = Vec::new();
    for repo in workspace.service_repositories() {
        if !is_working_copy(&repo.resolve(workspace.root())).await {
            missing.push(repo.clone());
        }
    }

    if !missing.is_empty() {
        info!(count = missing.len(), "cloning repositories missing for services");
        let orchestrator = Orchestrator::with_system_backends(workspace.root(), &cfg.engine)
            .with_cancellation(cancel.clone());
        let state = orchestrator.execute(missing).await;
        if state.failure_count > 0 {
            report::print_summary(&state, cfg.engine.max_retries);
            return Err(WillowcalError::InitFailed {
                failed: state.failure_count,
                total: state.total_jobs,
            }
            .into());
        }
    }

    let supervisor = Supervisor::new(
        Arc::new(workspace.clone()),
        SupervisorOptions::from(&cfg.engine),
        cancel.clone(),
    );

    let mut logs = supervisor.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(entry) = logs.recv().await {
            println!(
                "[{}] [{}] {}",
                entry.service_name,
                entry.timestamp.with_timezone(&Local).format("%H:%M:%S"),
                entry.line
            );
        }
    });

    let mut started = 0usize;
    for svc in workspace.services() {
        match supervisor.start(&svc.name).await {
            Ok(()) => started += 1,
            Err(e) => error!(service = %svc.name, error = %e, "failed to start service"),
        }
    }

    if started == 0 {
        printer.abort();
        return Err(anyhow!("no service could be started"));
    }
    info!(started, total = workspace.services().len(), "services started; press Ctrl-C to stop");

    let mut poll = tokio::time::interval(LIVENESS_POLL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = poll.tick() => {
                if supervisor.live_count().await == 0 {
                    info!("all services have exited");
                    break;
                }
            }
        }
    }

    supervisor.stop_all().await;

    for snap in supervisor.all_statuses().await {
        if snap.state == ServiceState::Failed {
            warn!(
                service = %snap.name,
                error = snap.error.as_deref().unwrap_or("unknown error"),
                "service failed"
            );
        }
    }

    // The log hub closes once the supervisor and its readers are gone.
    drop(supervisor);
    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        debug!("log printer still draining at exit");
    }
    Ok(())
}

/// Simple dry-run output: workspace, repositories and services.
fn print_dry_run(cfg: &ConfigFile, workspace: &Workspace) {
    println!("willowcal dry-run");
    println!("  workspace = {}", workspace.root().display());
    println!("  engine.max_parallel_jobs = {}", cfg.engine.max_parallel_jobs);
    println!("  engine.max_retries = {}", cfg.engine.max_retries);
    println!("  engine.command_timeout = {:?}", cfg.engine.command_timeout);
    println!();

    println!("repositories ({}):", workspace.repositories().len());
    for repo in workspace.repositories() {
        println!("  - {}", repo.name);
        println!("      url: {}", repo.source_url);
        println!("      path: {}", repo.resolve(workspace.root()).display());
        for (idx, cmd) in repo.setup_commands.iter().enumerate() {
            println!("      setup[{}]: {cmd}", idx + 1);
        }
    }
    println!();

    println!("services ({}):", workspace.services().len());
    for svc in workspace.services() {
        println!("  - {}", svc.name);
        println!("      repo: {}", svc.repository_name);
        println!("      cmd: {}", svc.run_command);
    }

    debug!("dry-run complete (no execution)");
}
