// src/state/repo.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExecutionStatus, RepoStatus};

/// One repository's clone-and-setup unit of work.
///
/// `destination_path` is relative to the workspace root; the orchestrator
/// resolves it before handing it to the clone/command collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryJob {
    pub name: String,
    #[serde(rename = "url")]
    pub source_url: String,
    #[serde(rename = "path")]
    pub destination_path: PathBuf,
    #[serde(default)]
    pub setup_commands: Vec<String>,
}

impl RepositoryJob {
    pub fn new(
        name: impl Into<String>,
        source_url: impl Into<String>,
        destination_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            destination_path: destination_path.into(),
            setup_commands: Vec::new(),
        }
    }

    pub fn with_setup_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.setup_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_setup_commands(&self) -> bool {
        !self.setup_commands.is_empty()
    }

    /// Absolute working-copy path under `workspace_root`.
    pub fn resolve(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(&self.destination_path)
    }
}

/// Result of one clone attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub duration: Duration,
    /// Combined stdout/stderr of the clone command.
    pub output: String,
    /// True when the working copy already existed and nothing was cloned.
    pub skipped: bool,
}

impl CloneOutcome {
    pub fn succeeded(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: true,
            error: None,
            duration,
            output: output.into(),
            skipped: false,
        }
    }

    pub fn already_present(destination: &Path, duration: Duration) -> Self {
        Self {
            success: true,
            error: None,
            duration,
            output: format!(
                "repository already exists at {}, skipping clone",
                destination.display()
            ),
            skipped: true,
        }
    }

    pub fn failed(error: impl Into<String>, output: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            duration,
            output: output.into(),
            skipped: false,
        }
    }
}

/// Result of one setup command.
///
/// A timeout or cancellation is reported as a failure with `exit_code == -1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub success: bool,
    pub exit_code: i32,
    pub error: Option<String>,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn succeeded(command: impl Into<String>, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            command: command.into(),
            success: true,
            exit_code: 0,
            error: None,
            duration,
            stdout,
            stderr,
        }
    }

    pub fn failed(
        command: impl Into<String>,
        exit_code: i32,
        error: impl Into<String>,
        stdout: String,
        stderr: String,
        duration: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            success: false,
            exit_code,
            error: Some(error.into()),
            duration,
            stdout,
            stderr,
        }
    }

    pub fn timed_out(command: impl Into<String>, limit: Duration, duration: Duration) -> Self {
        Self::failed(
            command,
            -1,
            format!("command timeout after {limit:?}"),
            String::new(),
            String::new(),
            duration,
        )
    }

    pub fn cancelled(command: impl Into<String>, duration: Duration) -> Self {
        Self::failed(command, -1, "command cancelled", String::new(), String::new(), duration)
    }
}

/// Mutable state of one job attempt, owned by the orchestrator while in
/// flight and handed out only as clones.
#[derive(Debug, Clone)]
pub struct RepoState {
    pub name: String,
    pub status: RepoStatus,
    pub clone_outcome: Option<CloneOutcome>,
    /// Append-only, in execution order.
    pub setup_outcomes: Vec<CommandResult>,
    /// Index of the attempt that produced this state (0 = first attempt).
    pub current_retry: u32,
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RepoState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RepoStatus::Pending,
            clone_outcome: None,
            setup_outcomes: Vec::new(),
            current_retry: 0,
            error: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn clone_succeeded(&self) -> bool {
        self.clone_outcome.as_ref().is_some_and(|c| c.success)
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = RepoStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
    }

    pub fn mark_success(&mut self) {
        self.status = RepoStatus::Success;
        self.error = None;
        self.end_time = Some(Utc::now());
    }

    /// `end_time - start_time`, or time elapsed so far while still in flight.
    pub fn duration(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }
}

/// Aggregate state of one `execute` run.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_jobs: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Retry attempts actually executed, across all jobs.
    pub retry_count: usize,
    pub status: ExecutionStatus,
    /// Latest state per job name.
    pub repo_states: BTreeMap<String, RepoState>,
}

impl ExecutionState {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            start_time: Utc::now(),
            end_time: None,
            total_jobs,
            success_count: 0,
            failure_count: 0,
            retry_count: 0,
            status: ExecutionStatus::Running,
            repo_states: BTreeMap::new(),
        }
    }

    /// Replace the latest state for `state.name`.
    pub fn record(&mut self, state: RepoState) {
        self.repo_states.insert(state.name.clone(), state);
    }

    /// Tally counts from the final state of every job and close the run.
    ///
    /// Idempotent: counts are recomputed rather than accumulated.
    pub fn finalize(&mut self) {
        self.success_count = self
            .repo_states
            .values()
            .filter(|s| s.status == RepoStatus::Success)
            .count();
        self.failure_count = self.repo_states.len() - self.success_count;
        self.end_time = Some(Utc::now());
        self.status = if self.failure_count > 0 {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
    }

    pub fn duration(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }

    pub fn failed_states(&self) -> impl Iterator<Item = &RepoState> {
        self.repo_states
            .values()
            .filter(|s| s.status == RepoStatus::Failed)
    }
}
