// src/exec/command.rs

//! Shell command construction and the production [`CommandExecutor`].

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::exec::backend::{BoxFuture, CommandExecutor};
use crate::exec::signal;
use crate::state::CommandResult;

/// Per-command limit when nothing else is configured.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Build a shell command appropriate for the platform.
///
/// Command lines are always handed to the interpreter so that `&&`, `|`,
/// `;` and redirections behave as written.
pub fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

/// How a captured process run ended.
pub(crate) enum Captured {
    Exited(Output),
    TimedOut,
    Cancelled,
    Failed(anyhow::Error),
}

/// Spawn `cmd`, capture both pipes, and wait for exit, the time limit or
/// cancellation, whichever comes first.
///
/// The process leads its own group. On timeout or cancellation the whole
/// group is killed, so nothing the shell forked outlives the attempt; the
/// dropped wait future then reaps the leader (`kill_on_drop`).
pub(crate) async fn run_captured(
    mut cmd: Command,
    label: &str,
    limit: Duration,
    cancel: &CancellationToken,
) -> Captured {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    signal::isolate_process_group(&mut cmd);

    let child = match cmd
        .spawn()
        .with_context(|| format!("spawning process for `{label}`"))
    {
        Ok(child) => child,
        Err(e) => return Captured::Failed(e),
    };
    let pid = child.id();

    let captured = tokio::select! {
        res = timeout(limit, child.wait_with_output()) => match res {
            Ok(Ok(output)) => return Captured::Exited(output),
            Ok(Err(e)) => return Captured::Failed(
                anyhow::Error::from(e).context(format!("waiting for process of `{label}`")),
            ),
            Err(_) => Captured::TimedOut,
        },
        _ = cancel.cancelled() => Captured::Cancelled,
    };

    if let Some(pid) = pid {
        let delivered = signal::kill_group(pid);
        debug!(cmd = %label, pid, delivered, "killed process group");
    }
    captured
}

/// Runs setup commands through the platform shell with a per-command
/// timeout.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    timeout: Duration,
}

impl ShellExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, command: &str, working_dir: &Path, cancel: &CancellationToken) -> CommandResult {
        let start = Instant::now();

        if command.trim().is_empty() {
            return CommandResult::failed(command, -1, "empty command", String::new(), String::new(), start.elapsed());
        }

        debug!(cmd = %command, dir = %working_dir.display(), "executing command");

        let mut cmd = shell_command(command);
        cmd.current_dir(working_dir);

        match run_captured(cmd, command, self.timeout, cancel).await {
            Captured::Exited(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let code = output.status.code().unwrap_or(-1);

                info!(
                    cmd = %command,
                    exit_code = code,
                    success = output.status.success(),
                    "command exited"
                );

                if output.status.success() {
                    CommandResult::succeeded(command, stdout, stderr, start.elapsed())
                } else {
                    CommandResult::failed(
                        command,
                        code,
                        output.status.to_string(),
                        stdout,
                        stderr,
                        start.elapsed(),
                    )
                }
            }
            Captured::TimedOut => {
                warn!(cmd = %command, limit = ?self.timeout, "command timed out; killed");
                CommandResult::timed_out(command, self.timeout, start.elapsed())
            }
            Captured::Cancelled => {
                info!(cmd = %command, "command cancelled; killed");
                CommandResult::cancelled(command, start.elapsed())
            }
            Captured::Failed(err) => {
                warn!(cmd = %command, error = %err, "command execution error");
                CommandResult::failed(
                    command,
                    -1,
                    format!("{err:#}"),
                    String::new(),
                    String::new(),
                    start.elapsed(),
                )
            }
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute<'a>(
        &'a self,
        command: &'a str,
        working_dir: &'a Path,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CommandResult> {
        Box::pin(self.run(command, working_dir, cancel))
    }
}
