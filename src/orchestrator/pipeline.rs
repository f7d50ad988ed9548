// src/orchestrator/pipeline.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::exec::{CloneOperation, CommandExecutor};
use crate::state::{CloneOutcome, RepoState, RepositoryJob};
use crate::types::RepoStatus;

/// One step of a job's pipeline, published for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub repo: String,
    pub status: RepoStatus,
    pub message: String,
}

/// Everything a single job attempt needs: the collaborators, the workspace
/// root, the run's cancellation scope and the optional progress sink.
///
/// Shared (behind an `Arc`) by every worker and by the retry phase.
pub(crate) struct Pipeline {
    pub(crate) cloner: Arc<dyn CloneOperation>,
    pub(crate) executor: Arc<dyn CommandExecutor>,
    pub(crate) workspace_root: PathBuf,
    pub(crate) cancel: CancellationToken,
    pub(crate) progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl Pipeline {
    /// Full attempt: clone, then setup commands.
    pub(crate) async fn process_repository(&self, job: &RepositoryJob) -> RepoState {
        let mut state = RepoState::new(&job.name);
        let destination = job.resolve(&self.workspace_root);

        if self.cancel.is_cancelled() {
            state.mark_failed("cancelled before clone");
            return state;
        }

        state.status = RepoStatus::Cloning;
        self.report(&job.name, RepoStatus::Cloning, "Cloning repository...");

        let outcome = self
            .cloner
            .clone_repository(&job.source_url, &destination, &self.cancel)
            .await;

        if !outcome.success {
            let reason = outcome
                .error
                .clone()
                .unwrap_or_else(|| "clone failed".to_string());
            state.clone_outcome = Some(outcome);
            warn!(repo = %job.name, error = %reason, "clone failed");
            self.report(&job.name, RepoStatus::Failed, &reason);
            state.mark_failed(reason);
            return state;
        }

        if outcome.skipped {
            self.report(
                &job.name,
                RepoStatus::Cloning,
                "Repository already exists, skipping clone",
            );
        }
        state.clone_outcome = Some(outcome);

        let banner = format!(
            "Running {} setup command(s)...",
            job.setup_commands.len()
        );
        self.run_setup(job, &destination, state, &banner).await
    }

    /// Retry attempt whose previous clone succeeded: the clone outcome is
    /// carried forward and only the setup commands run again.
    pub(crate) async fn retry_setup_only(
        &self,
        job: &RepositoryJob,
        previous_clone: CloneOutcome,
    ) -> RepoState {
        let mut state = RepoState::new(&job.name);
        state.clone_outcome = Some(previous_clone);

        let destination = job.resolve(&self.workspace_root);
        let banner = format!(
            "Retrying setup commands ({} command(s))...",
            job.setup_commands.len()
        );
        self.run_setup(job, &destination, state, &banner).await
    }

    /// Run setup commands in declared order, stopping at the first failure.
    async fn run_setup(
        &self,
        job: &RepositoryJob,
        working_dir: &Path,
        mut state: RepoState,
        banner: &str,
    ) -> RepoState {
        let total = job.setup_commands.len();

        if total > 0 {
            state.status = RepoStatus::SetupRunning;
            self.report(&job.name, RepoStatus::SetupRunning, banner);
        }

        for (idx, command) in job.setup_commands.iter().enumerate() {
            if self.cancel.is_cancelled() {
                let reason = format!("cancelled before command '{command}'");
                self.report(&job.name, RepoStatus::Failed, &reason);
                state.mark_failed(reason);
                return state;
            }

            self.report(
                &job.name,
                RepoStatus::SetupRunning,
                &format!("Executing command {}/{}: {}", idx + 1, total, command),
            );

            let result = self.executor.execute(command, working_dir, &self.cancel).await;
            let succeeded = result.success;
            let error = result.error.clone().unwrap_or_default();
            let exit_code = result.exit_code;
            state.setup_outcomes.push(result);

            if !succeeded {
                let reason = format!("command '{command}' failed: {error}");
                warn!(repo = %job.name, cmd = %command, exit_code, "setup command failed");
                self.report(&job.name, RepoStatus::Failed, &reason);
                state.mark_failed(reason);
                return state;
            }
        }

        state.mark_success();
        self.report(
            &job.name,
            RepoStatus::Success,
            "Repository initialized successfully",
        );
        state
    }

    fn report(&self, repo: &str, status: RepoStatus, message: &str) {
        info!(repo = %repo, %status, "{message}");

        let Some(tx) = &self.progress else {
            return;
        };
        let event = ProgressEvent {
            repo: repo.to_string(),
            status,
            message: message.to_string(),
        };
        if tx.try_send(event).is_err() {
            debug!(repo = %repo, "progress queue full or closed; dropping event");
        }
    }
}
