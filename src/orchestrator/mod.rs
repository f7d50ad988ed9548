// src/orchestrator/mod.rs

//! Execution orchestrator: clones repositories and runs their setup
//! commands on a bounded worker pool, then retries failures one at a time.
//!
//! Flow of one [`Orchestrator::execute`] call:
//! 1. Parallel pass: `min(max_parallel_jobs, N)` workers drain a shared
//!    queue (`worker.rs`), each job going through the pipeline
//!    (`pipeline.rs`).
//! 2. Every failed result is queued in a FIFO [`RetryQueue`] (`retry.rs`).
//! 3. Retry pass: entries are drained sequentially. A job whose last clone
//!    succeeded only re-runs its setup commands.
//! 4. Counts are tallied from the final state of every job.
//!
//! The execution state and the retry queue sit behind one mutex shared by
//! the result collector and the retry pass. Readers get clones.

pub mod pipeline;
pub mod retry;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::EngineSettings;
use crate::exec::{CloneOperation, CommandExecutor, GitCloner, ShellExecutor};
use crate::state::{ExecutionState, RepositoryJob};
use crate::types::RepoStatus;

pub use pipeline::ProgressEvent;
pub use retry::{RetryEntry, RetryQueue};

use pipeline::Pipeline;

/// Upper bound on concurrently running pipelines.
pub const MAX_PARALLEL_JOBS: usize = 5;

/// Retry attempts allowed per job after its first attempt.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub max_parallel_jobs: usize,
    pub max_retries: u32,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_parallel_jobs: MAX_PARALLEL_JOBS,
            max_retries: MAX_RETRIES,
        }
    }
}

impl From<&EngineSettings> for OrchestratorOptions {
    fn from(engine: &EngineSettings) -> Self {
        Self {
            max_parallel_jobs: engine.max_parallel_jobs.max(1),
            max_retries: engine.max_retries,
        }
    }
}

/// State guarded by the orchestrator's single mutex.
struct Ledger {
    execution: ExecutionState,
    retries: RetryQueue,
}

pub struct Orchestrator {
    cloner: Arc<dyn CloneOperation>,
    executor: Arc<dyn CommandExecutor>,
    workspace_root: PathBuf,
    options: OrchestratorOptions,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<ProgressEvent>>,

    ledger: Arc<Mutex<Ledger>>,
    /// Serializes whole `execute` calls on one orchestrator.
    run_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        cloner: Arc<dyn CloneOperation>,
        executor: Arc<dyn CommandExecutor>,
        workspace_root: impl Into<PathBuf>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            cloner,
            executor,
            workspace_root: workspace_root.into(),
            options,
            cancel: CancellationToken::new(),
            progress: None,
            ledger: Arc::new(Mutex::new(Ledger {
                execution: ExecutionState::new(0),
                retries: RetryQueue::new(options.max_retries),
            })),
            run_lock: Mutex::new(()),
        }
    }

    /// Orchestrator backed by `git` and the platform shell, limits taken
    /// from the `[engine]` settings.
    pub fn with_system_backends(
        workspace_root: impl Into<PathBuf>,
        engine: &EngineSettings,
    ) -> Self {
        Self::new(
            Arc::new(GitCloner::new(engine.command_timeout)),
            Arc::new(ShellExecutor::new(engine.command_timeout)),
            workspace_root,
            OrchestratorOptions::from(engine),
        )
    }

    /// Bind in-flight pipelines to `token`; cancelling it kills running
    /// commands and stops further retries.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Publish per-step progress on `tx`. Sends never block; events are
    /// dropped when the queue is full.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn options(&self) -> OrchestratorOptions {
        self.options
    }

    /// Copy of the current (or last) run's execution state.
    pub async fn snapshot(&self) -> ExecutionState {
        self.ledger.lock().await.execution.clone()
    }

    /// Run every job to a final state and return the aggregate.
    ///
    /// Job failures are recorded, never returned as errors; callers inspect
    /// `failure_count`.
    pub async fn execute(&self, jobs: Vec<RepositoryJob>) -> ExecutionState {
        let _run = self.run_lock.lock().await;
        let total = jobs.len();

        {
            let mut ledger = self.ledger.lock().await;
            ledger.execution = ExecutionState::new(total);
            ledger.retries = RetryQueue::new(self.options.max_retries);
        }

        info!(
            jobs = total,
            max_parallel = self.options.max_parallel_jobs,
            max_retries = self.options.max_retries,
            "starting execution"
        );

        let pipeline = Arc::new(Pipeline {
            cloner: Arc::clone(&self.cloner),
            executor: Arc::clone(&self.executor),
            workspace_root: self.workspace_root.clone(),
            cancel: self.cancel.clone(),
            progress: self.progress.clone(),
        });

        if total > 0 {
            self.parallel_pass(&pipeline, jobs).await;
            self.retry_pass(&pipeline).await;
        }

        let mut ledger = self.ledger.lock().await;
        ledger.execution.finalize();
        info!(
            success = ledger.execution.success_count,
            failed = ledger.execution.failure_count,
            retries = ledger.execution.retry_count,
            status = %ledger.execution.status,
            "execution finished"
        );
        ledger.execution.clone()
    }

    async fn parallel_pass(&self, pipeline: &Arc<Pipeline>, jobs: Vec<RepositoryJob>) {
        let workers = self.options.max_parallel_jobs.max(1).min(jobs.len());
        let (tx, mut rx) = mpsc::channel(jobs.len());
        let pool = tokio::spawn(worker::run_pool(
            Arc::clone(pipeline),
            jobs.clone(),
            workers,
            tx,
        ));

        while let Some(state) = rx.recv().await {
            let mut ledger = self.ledger.lock().await;
            if state.status == RepoStatus::Failed {
                if let Some(job) = jobs.iter().find(|j| j.name == state.name) {
                    ledger.retries.schedule(job.clone(), state.current_retry);
                }
            }
            ledger.execution.record(state);
        }

        if let Err(e) = pool.await {
            error!(error = %e, "worker pool terminated abnormally");
        }
    }

    async fn retry_pass(&self, pipeline: &Pipeline) {
        loop {
            let (entry, previous_clone) = {
                let mut ledger = self.ledger.lock().await;

                if self.cancel.is_cancelled() {
                    let dropped = ledger.retries.clear();
                    if dropped > 0 {
                        warn!(dropped, "cancelled; abandoning queued retries");
                    }
                    return;
                }

                let Some(entry) = ledger.retries.pop() else {
                    return;
                };
                let previous_clone = ledger
                    .execution
                    .repo_states
                    .get(&entry.job.name)
                    .and_then(|s| s.clone_outcome.clone())
                    .filter(|c| c.success);
                (entry, previous_clone)
            };

            info!(
                repo = %entry.job.name,
                attempt = entry.attempt,
                max = self.options.max_retries,
                reuse_clone = previous_clone.is_some(),
                "retrying job"
            );

            let mut state = match previous_clone {
                Some(clone) => pipeline.retry_setup_only(&entry.job, clone).await,
                None => pipeline.process_repository(&entry.job).await,
            };
            state.current_retry = entry.attempt;

            let mut ledger = self.ledger.lock().await;
            ledger.execution.retry_count += 1;
            if state.status == RepoStatus::Failed {
                ledger.retries.schedule(entry.job, entry.attempt);
            }
            ledger.execution.record(state);
        }
    }
}
