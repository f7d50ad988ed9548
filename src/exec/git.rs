// src/exec/git.rs

//! Production [`CloneOperation`] backed by the `git` binary.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::exec::backend::{BoxFuture, CloneOperation};
use crate::exec::command::{run_captured, Captured, DEFAULT_COMMAND_TIMEOUT};
use crate::state::CloneOutcome;

/// Clones with `git clone <url> <dest>`, skipping destinations that already
/// contain a `.git` directory.
#[derive(Debug, Clone)]
pub struct GitCloner {
    timeout: Duration,
}

impl GitCloner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn clone_into(&self, url: &str, destination: &Path, cancel: &CancellationToken) -> CloneOutcome {
        let start = Instant::now();

        if is_working_copy(destination).await {
            debug!(dest = %destination.display(), "working copy present; skipping clone");
            return CloneOutcome::already_present(destination, start.elapsed());
        }

        if let Some(parent) = destination.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return CloneOutcome::failed(
                    format!("failed to create parent directory: {e}"),
                    String::new(),
                    start.elapsed(),
                );
            }
        }

        info!(url = %url, dest = %destination.display(), "cloning repository");

        let mut cmd = Command::new("git");
        cmd.arg("clone").arg(url).arg(destination);

        match run_captured(cmd, "git clone", self.timeout, cancel).await {
            Captured::Exited(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));

                if output.status.success() {
                    CloneOutcome::succeeded(combined, start.elapsed())
                } else {
                    warn!(url = %url, status = %output.status, "git clone failed");
                    CloneOutcome::failed(
                        format!("git clone failed: {}", output.status),
                        combined,
                        start.elapsed(),
                    )
                }
            }
            Captured::TimedOut => CloneOutcome::failed(
                format!("git clone failed: timeout after {:?}", self.timeout),
                String::new(),
                start.elapsed(),
            ),
            Captured::Cancelled => {
                CloneOutcome::failed("git clone failed: cancelled", String::new(), start.elapsed())
            }
            Captured::Failed(err) => CloneOutcome::failed(
                format!("git clone failed: {err:#}"),
                String::new(),
                start.elapsed(),
            ),
        }
    }
}

impl Default for GitCloner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl CloneOperation for GitCloner {
    fn clone_repository<'a>(
        &'a self,
        url: &'a str,
        destination: &'a Path,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CloneOutcome> {
        Box::pin(self.clone_into(url, destination, cancel))
    }
}

/// True if `path/.git` exists.
pub async fn is_working_copy(path: &Path) -> bool {
    tokio::fs::metadata(path.join(".git")).await.is_ok()
}
