// src/state/service.rs

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LogStream, ServiceState};

/// A named long-running service and the repository it runs out of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(rename = "repo")]
    pub repository_name: String,
    pub run_command: String,
}

impl ServiceDescriptor {
    pub fn new(
        name: impl Into<String>,
        repository_name: impl Into<String>,
        run_command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            repository_name: repository_name.into(),
            run_command: run_command.into(),
        }
    }
}

/// One line of service output, timestamped when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub service_name: String,
    pub timestamp: DateTime<Utc>,
    pub line: String,
    pub stream: LogStream,
}

impl LogEntry {
    pub fn now(service_name: impl Into<String>, line: impl Into<String>, stream: LogStream) -> Self {
        Self {
            service_name: service_name.into(),
            timestamp: Utc::now(),
            line: line.into(),
            stream,
        }
    }
}

/// Immutable copy of a supervised instance.
///
/// Carries a plain process id rather than a handle, so holding a snapshot
/// never gives anyone the ability to signal or wait on the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub name: String,
    pub descriptor: Option<ServiceDescriptor>,
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ServiceSnapshot {
    /// Snapshot for a configured service that has never been started.
    pub fn stopped(descriptor: ServiceDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            descriptor: Some(descriptor),
            state: ServiceState::Stopped,
            pid: None,
            start_time: None,
            error: None,
        }
    }

    /// Time since start, only while the instance is live.
    pub fn uptime(&self) -> Option<Duration> {
        if !self.state.is_live() {
            return None;
        }
        self.start_time
            .and_then(|start| (Utc::now() - start).to_std().ok())
    }
}
