// src/report.rs

//! Console output for `init`: per-step progress lines and the final
//! execution summary.

use std::io::{self, Write};

use crate::orchestrator::ProgressEvent;
use crate::state::ExecutionState;
use crate::types::RepoStatus;

const RULE: &str = "--------------------------------------------";

/// One progress line, e.g. `[setup ] [api] Executing command 1/2: npm ci`.
pub fn format_progress(event: &ProgressEvent) -> String {
    let tag = match event.status {
        RepoStatus::Pending => "wait  ",
        RepoStatus::Cloning => "clone ",
        RepoStatus::SetupRunning => "setup ",
        RepoStatus::Success => "ok    ",
        RepoStatus::Failed => "FAILED",
    };
    format!("[{tag}] [{}] {}", event.repo, event.message)
}

pub fn print_summary(state: &ExecutionState, max_retries: u32) {
    let stdout = io::stdout();
    // Nothing sensible to do if stdout is gone.
    let _ = write_summary(&mut stdout.lock(), state, max_retries);
}

pub fn write_summary<W: Write>(out: &mut W, state: &ExecutionState, max_retries: u32) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Execution summary")?;
    writeln!(out, "{RULE}")?;
    writeln!(out, "Total duration:     {:.3}s", state.duration().as_secs_f64())?;
    writeln!(out, "Total repositories: {}", state.total_jobs)?;
    writeln!(out, "Successful:         {}", state.success_count)?;
    writeln!(out, "Failed:             {}", state.failure_count)?;
    writeln!(out, "Total retries:      {}", state.retry_count)?;
    writeln!(out)?;

    if state.failure_count > 0 {
        writeln!(out, "Failed repositories:")?;
        for repo in state.failed_states() {
            writeln!(out, "  - {}", repo.name)?;
            writeln!(out, "    Error: {}", repo.error.as_deref().unwrap_or("unknown error"))?;
            if repo.current_retry > 0 {
                writeln!(out, "    Retries: {}/{}", repo.current_retry, max_retries)?;
            }
        }
        writeln!(out)?;
    }

    if state.success_count > 0 {
        writeln!(out, "Successful repositories:")?;
        for repo in state
            .repo_states
            .values()
            .filter(|r| r.status == RepoStatus::Success)
        {
            writeln!(out, "  - {} ({:.1}s)", repo.name, repo.duration().as_secs_f64())?;
        }
    }

    Ok(())
}
