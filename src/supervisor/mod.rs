// src/supervisor/mod.rs

//! Service supervisor: starts, stops and streams logs for long-running
//! service processes.
//!
//! State machine per service name:
//!
//! ```text
//! Stopped --start--> Starting --spawned--> Running --exit 0 / stop--> Stopped
//!                                          Running --crash----------> Failed
//! ```
//!
//! - `start` on a Starting or Running service is rejected.
//! - `stop` on anything but Running is rejected.
//! - Failed and Stopped services can be started again.
//!
//! The instance table is one mutex-guarded map; callers only ever get
//! [`ServiceSnapshot`] copies out of it.

pub mod catalog;
pub mod instance;
pub mod logs;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::EngineSettings;
use crate::errors::{Result, WillowcalError};
use crate::state::{LogEntry, ServiceSnapshot};
use crate::types::ServiceState;

pub use catalog::ServiceCatalog;
pub use logs::{LogHub, GLOBAL_LOG_CAPACITY, INSTANCE_LOG_CAPACITY};

use instance::{InstanceTable, ProcessControl, ServiceInstance, Supervision};

/// Bound on how long we wait for the kernel to reap a force-killed process.
const KILL_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Wait after the graceful signal before `stop` force-kills.
    pub grace_period: Duration,
    /// Single shared wait used by `stop_all`.
    pub shutdown_grace_period: Duration,
    pub instance_log_capacity: usize,
    pub global_log_capacity: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            shutdown_grace_period: Duration::from_secs(2),
            instance_log_capacity: INSTANCE_LOG_CAPACITY,
            global_log_capacity: GLOBAL_LOG_CAPACITY,
        }
    }
}

impl From<&EngineSettings> for SupervisorOptions {
    fn from(engine: &EngineSettings) -> Self {
        Self {
            grace_period: engine.grace_period,
            shutdown_grace_period: engine.shutdown_grace_period,
            ..Self::default()
        }
    }
}

/// Cheap to clone; clones share one instance table.
#[derive(Clone)]
pub struct Supervisor {
    catalog: Arc<dyn ServiceCatalog>,
    table: InstanceTable,
    hub: Arc<LogHub>,
    options: SupervisorOptions,
    cancel: CancellationToken,
    generations: Arc<AtomicU64>,
}

impl Supervisor {
    /// Every instance runs in a child scope of `cancel`; cancelling it
    /// signals all supervised processes.
    pub fn new(
        catalog: Arc<dyn ServiceCatalog>,
        options: SupervisorOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            catalog,
            table: Arc::new(Mutex::new(HashMap::new())),
            hub: Arc::new(LogHub::new(options.global_log_capacity)),
            options,
            cancel,
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn options(&self) -> SupervisorOptions {
        self.options
    }

    /// Start `name`. Returns once the process is spawned and registered as
    /// Running; its output and exit are handled in the background.
    pub async fn start(&self, name: &str) -> Result<()> {
        let descriptor = self
            .catalog
            .descriptor(name)
            .ok_or_else(|| WillowcalError::ServiceNotFound(name.to_string()))?;
        let working_dir = self
            .catalog
            .working_dir(&descriptor.repository_name)
            .ok_or_else(|| WillowcalError::RepositoryNotFound(descriptor.repository_name.clone()))?;

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut table = self.table.lock().await;
            if table.get(name).is_some_and(|i| i.state.is_live()) {
                return Err(WillowcalError::ServiceAlreadyRunning(name.to_string()));
            }
            table.insert(
                name.to_string(),
                ServiceInstance::starting(descriptor.clone(), generation),
            );
        }

        info!(
            service = %name,
            cmd = %descriptor.run_command,
            dir = %working_dir.display(),
            "starting service"
        );

        let child = match instance::spawn_process(&descriptor, &working_dir) {
            Ok(child) => child,
            Err(e) => {
                self.table.lock().await.remove(name);
                error!(service = %name, error = %e, "failed to spawn service");
                return Err(WillowcalError::SpawnFailed {
                    service: name.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let pid = child.id();
        let (supervision, logs) = Supervision::new(
            self.cancel.child_token(),
            pid,
            generation,
            self.options.instance_log_capacity,
        );

        {
            let mut table = self.table.lock().await;
            if let Some(inst) = table.get_mut(name) {
                inst.state = ServiceState::Running;
                inst.pid = pid;
                inst.control = Some(supervision.control.clone());
                inst.logs = Some(logs);
            }
        }

        info!(service = %name, ?pid, "service running");
        supervision.launch(
            name.to_string(),
            child,
            Arc::clone(&self.table),
            Arc::clone(&self.hub),
        );
        Ok(())
    }

    /// Graceful stop with forced kill after the grace period. The instance
    /// ends Stopped either way.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let mut control = self.stoppable(name).await?;

        info!(service = %name, grace = ?self.options.grace_period, "stopping service");
        control.request_stop();

        if timeout(self.options.grace_period, control.wait_exited())
            .await
            .is_err()
        {
            warn!(service = %name, "service ignored graceful stop; force-killing");
            force_and_reap(name, &mut control).await;
        }

        self.mark_stopped(name, control.generation()).await;
        info!(service = %name, "service stopped");
        Ok(())
    }

    /// Stop every Running service with one shared grace period, then
    /// force-kill whatever is left.
    pub async fn stop_all(&self) {
        let mut pending: Vec<(String, ProcessControl)> = {
            let table = self.table.lock().await;
            table
                .iter()
                .filter_map(|(name, inst)| inst.stoppable().map(|c| (name.clone(), c)))
                .collect()
        };

        if pending.is_empty() {
            return;
        }

        info!(
            services = pending.len(),
            grace = ?self.options.shutdown_grace_period,
            "stopping all services"
        );
        for (_, control) in &pending {
            control.request_stop();
        }

        let deadline = Instant::now() + self.options.shutdown_grace_period;
        for (name, control) in &mut pending {
            if timeout_at(deadline, control.wait_exited()).await.is_err() {
                warn!(service = %name, "service still running after shutdown grace; force-killing");
                control.force_kill();
            }
        }

        let reap_deadline = Instant::now() + KILL_WAIT;
        for (name, control) in &mut pending {
            if timeout_at(reap_deadline, control.wait_exited()).await.is_err() {
                error!(service = %name, "service did not exit after force-kill");
            }
        }

        for (name, control) in &pending {
            self.mark_stopped(name, control.generation()).await;
        }
    }

    /// Snapshot of `name`. A configured service that was never started
    /// reports Stopped.
    pub async fn status(&self, name: &str) -> Result<ServiceSnapshot> {
        if let Some(inst) = self.table.lock().await.get(name) {
            return Ok(inst.snapshot());
        }
        self.catalog
            .descriptor(name)
            .map(ServiceSnapshot::stopped)
            .ok_or_else(|| WillowcalError::ServiceNotFound(name.to_string()))
    }

    /// Snapshots of every configured service, in configuration order.
    pub async fn all_statuses(&self) -> Vec<ServiceSnapshot> {
        let table = self.table.lock().await;
        self.catalog
            .descriptors()
            .into_iter()
            .map(|desc| match table.get(&desc.name) {
                Some(inst) => inst.snapshot(),
                None => ServiceSnapshot::stopped(desc),
            })
            .collect()
    }

    /// Number of services currently Starting or Running.
    pub async fn live_count(&self) -> usize {
        self.table
            .lock()
            .await
            .values()
            .filter(|i| i.state.is_live())
            .count()
    }

    /// New subscriber to log entries from every service.
    pub fn subscribe(&self) -> mpsc::Receiver<LogEntry> {
        self.hub.subscribe()
    }

    /// The per-instance log queue of the current instance of `name`.
    /// Handed out once per start; ends when the process exits.
    pub async fn take_instance_logs(&self, name: &str) -> Option<mpsc::Receiver<LogEntry>> {
        self.table.lock().await.get_mut(name)?.logs.take()
    }

    async fn stoppable(&self, name: &str) -> Result<ProcessControl> {
        let table = self.table.lock().await;
        match table.get(name) {
            Some(inst) => inst
                .stoppable()
                .ok_or_else(|| WillowcalError::ServiceNotRunning(name.to_string())),
            None if self.catalog.descriptor(name).is_some() => {
                Err(WillowcalError::ServiceNotRunning(name.to_string()))
            }
            None => Err(WillowcalError::ServiceNotFound(name.to_string())),
        }
    }

    async fn mark_stopped(&self, name: &str, generation: u64) {
        if let Some(inst) = self.table.lock().await.get_mut(name) {
            inst.mark_stopped(generation);
        }
    }
}

async fn force_and_reap(name: &str, control: &mut ProcessControl) {
    control.force_kill();
    if timeout(KILL_WAIT, control.wait_exited()).await.is_err() {
        error!(service = %name, "service did not exit after force-kill");
    }
}
