// src/orchestrator/retry.rs

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::state::RepositoryJob;

/// A job waiting for another attempt.
#[derive(Debug, Clone)]
pub struct RetryEntry {
    pub job: RepositoryJob,
    /// Retry index this entry will run as (1 = first retry).
    pub attempt: u32,
}

/// FIFO of failed jobs that still have retry budget.
///
/// Semantics:
/// - Budgets are per job: a job that failed on attempt `k` is queued as
///   attempt `k + 1` only while `k + 1 <= max_retries`.
/// - Entries are drained oldest first; a job that fails again goes to the
///   back, so distinct failing jobs take turns.
#[derive(Debug)]
pub struct RetryQueue {
    max_retries: u32,
    entries: VecDeque<RetryEntry>,
}

impl RetryQueue {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            entries: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Record that `job` failed on attempt `failed_attempt` (0 = initial run).
    ///
    /// Returns true if the job was queued for another attempt, false if its
    /// retry budget is exhausted.
    pub fn schedule(&mut self, job: RepositoryJob, failed_attempt: u32) -> bool {
        let next = failed_attempt + 1;
        if next > self.max_retries {
            warn!(
                repo = %job.name,
                attempts = failed_attempt + 1,
                "retry budget exhausted; leaving job failed"
            );
            return false;
        }

        debug!(repo = %job.name, attempt = next, queued = self.entries.len() + 1, "queued for retry");
        self.entries.push_back(RetryEntry { job, attempt: next });
        true
    }

    /// Take the oldest queued entry.
    pub fn pop(&mut self) -> Option<RetryEntry> {
        self.entries.pop_front()
    }

    /// Drop everything still queued (used on cancellation).
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}
