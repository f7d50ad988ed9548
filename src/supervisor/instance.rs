// src/supervisor/instance.rs

//! One supervised process: its table entry, the spawn, the two pipe readers
//! and the exit monitor.
//!
//! The `Child` handle is owned by the exit monitor task alone. Everyone else
//! reaches the process through [`ProcessControl`]: a cancellation token, a
//! forced-kill notification and an "exited" watch flag.

use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::exec::{shell_command, signal};
use crate::state::{LogEntry, ServiceDescriptor, ServiceSnapshot};
use crate::supervisor::logs::{InstanceQueue, LogHub};
use crate::types::{LogStream, ServiceState};

/// Service name -> instance, guarded by the supervisor's single mutex.
pub(crate) type InstanceTable = Arc<Mutex<HashMap<String, ServiceInstance>>>;

/// How long the exit monitor lets readers drain buffered output before it
/// closes the instance queue.
const READER_DRAIN: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub(crate) struct ServiceInstance {
    pub(crate) descriptor: ServiceDescriptor,
    pub(crate) state: ServiceState,
    pub(crate) pid: Option<u32>,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) error: Option<String>,
    /// Distinguishes successive starts of the same service so a late exit
    /// monitor never overwrites a newer instance.
    pub(crate) generation: u64,
    pub(crate) control: Option<ProcessControl>,
    pub(crate) logs: Option<mpsc::Receiver<LogEntry>>,
}

impl ServiceInstance {
    pub(crate) fn starting(descriptor: ServiceDescriptor, generation: u64) -> Self {
        Self {
            descriptor,
            state: ServiceState::Starting,
            pid: None,
            start_time: Some(Utc::now()),
            error: None,
            generation,
            control: None,
            logs: None,
        }
    }

    pub(crate) fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            name: self.descriptor.name.clone(),
            descriptor: Some(self.descriptor.clone()),
            state: self.state,
            pid: self.pid,
            start_time: self.start_time,
            error: self.error.clone(),
        }
    }

    /// Control handle, only while the process is Running.
    pub(crate) fn stoppable(&self) -> Option<ProcessControl> {
        if self.state != ServiceState::Running {
            return None;
        }
        self.control.clone()
    }

    /// Final transition after a completed stop sequence; ignored if a newer
    /// start has replaced the instance that was stopped.
    pub(crate) fn mark_stopped(&mut self, generation: u64) {
        if self.generation != generation {
            return;
        }
        self.state = ServiceState::Stopped;
        self.pid = None;
        self.error = None;
    }
}

/// Handle for asking a supervised process to stop.
#[derive(Debug, Clone)]
pub(crate) struct ProcessControl {
    cancel: CancellationToken,
    kill: Arc<Notify>,
    exited: watch::Receiver<bool>,
    /// Set by the exit monitor as soon as the leader is reaped; its pid may
    /// be reused from then on.
    reaped: Arc<AtomicBool>,
    pid: Option<u32>,
    generation: u64,
}

impl ProcessControl {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel the instance scope; the exit monitor answers with a graceful
    /// termination signal to the process group.
    pub(crate) fn request_stop(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn force_kill(&self) {
        if let Some(pid) = self.pid {
            if !self.reaped.load(Ordering::Acquire) {
                signal::kill(pid);
            }
        }
        self.kill.notify_one();
    }

    /// Resolves once the exit monitor has observed process exit.
    pub(crate) async fn wait_exited(&mut self) {
        // An error means the monitor is gone, which also means exited.
        let _ = self.exited.wait_for(|done| *done).await;
    }
}

/// Spawn the run command of `descriptor` in `working_dir`, in its own
/// process group with both pipes captured.
pub(crate) fn spawn_process(
    descriptor: &ServiceDescriptor,
    working_dir: &Path,
) -> std::io::Result<Child> {
    let mut cmd = shell_command(&descriptor.run_command);
    cmd.current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    signal::isolate_process_group(&mut cmd);
    cmd.spawn()
}

/// Everything needed to supervise a freshly spawned child.
pub(crate) struct Supervision {
    pub(crate) control: ProcessControl,
    monitor: MonitorArgs,
}

struct MonitorArgs {
    cancel: CancellationToken,
    kill: Arc<Notify>,
    exited: watch::Sender<bool>,
    reaped: Arc<AtomicBool>,
    queue: InstanceQueue,
}

impl Supervision {
    /// Returns the supervision bundle and the receiving end of the
    /// instance's log queue.
    pub(crate) fn new(
        cancel: CancellationToken,
        pid: Option<u32>,
        generation: u64,
        log_capacity: usize,
    ) -> (Self, mpsc::Receiver<LogEntry>) {
        let kill = Arc::new(Notify::new());
        let reaped = Arc::new(AtomicBool::new(false));
        let (exited_tx, exited_rx) = watch::channel(false);
        let (queue, logs) = InstanceQueue::new(log_capacity);

        let supervision = Self {
            control: ProcessControl {
                cancel: cancel.clone(),
                kill: Arc::clone(&kill),
                exited: exited_rx,
                reaped: Arc::clone(&reaped),
                pid,
                generation,
            },
            monitor: MonitorArgs {
                cancel,
                kill,
                exited: exited_tx,
                reaped,
                queue,
            },
        };
        (supervision, logs)
    }

    /// Start the stdout/stderr readers and the exit monitor for `child`.
    ///
    /// Must be called after the instance is recorded as Running, so the
    /// monitor's final transition always lands after it.
    pub(crate) fn launch(
        self,
        name: String,
        mut child: Child,
        table: InstanceTable,
        hub: Arc<LogHub>,
    ) {
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(
                name.clone(),
                LogStream::Stdout,
                stdout,
                self.monitor.queue.clone(),
                Arc::clone(&hub),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(
                name.clone(),
                LogStream::Stderr,
                stderr,
                self.monitor.queue.clone(),
                hub,
            ));
        }

        tokio::spawn(monitor_exit(
            name,
            self.control.generation,
            child,
            readers,
            table,
            self.monitor,
        ));
    }
}

fn spawn_reader<R>(
    service: String,
    stream: LogStream,
    pipe: R,
    queue: InstanceQueue,
    hub: Arc<LogHub>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        let mut dropped = 0usize;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    let entry = LogEntry::now(&service, line, stream);
                    hub.publish(&entry);
                    if !queue.offer(entry) {
                        dropped += 1;
                    }
                }
                Err(e) => {
                    debug!(service = %service, %stream, error = %e, "log reader failed");
                    break;
                }
            }
        }

        debug!(service = %service, %stream, dropped, "log reader reached end of stream");
    })
}

async fn monitor_exit(
    name: String,
    generation: u64,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    table: InstanceTable,
    args: MonitorArgs,
) {
    let pid = child.id();
    let mut signalled = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = args.kill.notified() => {
                warn!(service = %name, ?pid, "force-killing service");
                if let Err(e) = child.start_kill() {
                    debug!(service = %name, error = %e, "start_kill failed; process likely gone");
                }
                break child.wait().await;
            }
            _ = args.cancel.cancelled(), if !signalled => {
                signalled = true;
                let delivered = pid.is_some_and(signal::terminate);
                debug!(service = %name, ?pid, delivered, "sent graceful termination");
                if !delivered {
                    if let Err(e) = child.start_kill() {
                        debug!(service = %name, error = %e, "start_kill failed; process likely gone");
                    }
                }
            }
        }
    };
    args.reaped.store(true, Ordering::Release);

    let stop_requested = args.cancel.is_cancelled();
    let (state, error) = classify_exit(&status, stop_requested);
    match &error {
        Some(err) => warn!(service = %name, error = %err, "service crashed"),
        None => info!(service = %name, ?status, stop_requested, "service exited"),
    }

    for reader in readers {
        let abort = reader.abort_handle();
        if timeout(READER_DRAIN, reader).await.is_err() {
            debug!(service = %name, "reader still blocked after exit; aborting");
            abort.abort();
        }
    }
    args.queue.close();

    {
        let mut table = table.lock().await;
        if let Some(instance) = table.get_mut(&name) {
            if instance.generation == generation && instance.state == ServiceState::Running {
                instance.state = state;
                instance.pid = None;
                instance.error = error;
            }
        }
    }

    let _ = args.exited.send(true);
}

/// Exit code 0 is never a crash; neither is any exit we asked for.
fn classify_exit(
    status: &std::io::Result<ExitStatus>,
    stop_requested: bool,
) -> (ServiceState, Option<String>) {
    match status {
        Ok(s) if s.success() => (ServiceState::Stopped, None),
        _ if stop_requested => (ServiceState::Stopped, None),
        Ok(s) => (ServiceState::Failed, Some(format!("process exited with {s}"))),
        Err(e) => (
            ServiceState::Failed,
            Some(format!("failed to wait for process: {e}")),
        ),
    }
}
