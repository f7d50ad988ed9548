// src/control.rs

//! Typed control messages and their dispatch onto the engines.
//!
//! Wire form is one JSON object per message:
//!
//! ```json
//! {"id": "42", "type": "service.start", "payload": {"service_name": "api"}}
//! ```
//!
//! `type`/`payload` are the adjacently tagged [`Request`] / [`Reply`] body;
//! `id` is optional, carried beside the body and echoed on every reply.
//! Transport and connection handling live elsewhere; this module only turns
//! text into typed requests and requests into replies.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Workspace;
use crate::errors::{Result, WillowcalError};
use crate::orchestrator::{Orchestrator, ProgressEvent};
use crate::state::{ExecutionState, LogEntry, RepositoryJob, ServiceSnapshot};
use crate::supervisor::Supervisor;
use crate::types::{LogStream, RepoStatus, ServiceState};

/// Client -> server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Request {
    #[serde(rename = "init.start")]
    InitStart,
    #[serde(rename = "service.list")]
    ServiceList,
    #[serde(rename = "service.start")]
    ServiceStart(ServiceRef),
    #[serde(rename = "service.stop")]
    ServiceStop(ServiceRef),
    /// Empty or missing `service_name` means every service.
    #[serde(rename = "service.status")]
    ServiceStatus(StatusQuery),
}

/// Server -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Reply {
    #[serde(rename = "init.progress")]
    InitProgress(ProgressPayload),
    #[serde(rename = "init.complete")]
    InitComplete(InitCompletePayload),
    #[serde(rename = "service.list")]
    ServiceList(ServiceListPayload),
    #[serde(rename = "service.status")]
    ServiceStatus(ServiceStatusListPayload),
    #[serde(rename = "service.log")]
    ServiceLog(LogPayload),
    #[serde(rename = "service.started")]
    ServiceStarted(ServiceRef),
    #[serde(rename = "service.stopped")]
    ServiceStopped(ServiceRef),
    #[serde(rename = "error")]
    Error(ErrorPayload),
    #[serde(rename = "success")]
    Success(SuccessPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub service_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub repo_name: String,
    pub status: RepoStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitCompletePayload {
    pub success_count: usize,
    pub failed_count: usize,
    pub total_time_seconds: f64,
    pub repositories: Vec<RepositorySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub name: String,
    pub status: RepoStatus,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceListPayload {
    pub services: Vec<ServiceInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub repository: String,
    pub run_command: String,
    pub status: ServiceState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatusListPayload {
    pub services: Vec<ServiceStatusPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatusPayload {
    pub name: String,
    pub status: ServiceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    pub service_name: String,
    /// RFC 3339.
    pub timestamp: String,
    pub line: String,
    pub stream: LogStream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessPayload {
    pub message: String,
}

impl From<&ExecutionState> for InitCompletePayload {
    fn from(state: &ExecutionState) -> Self {
        Self {
            success_count: state.success_count,
            failed_count: state.failure_count,
            total_time_seconds: state.duration().as_secs_f64(),
            repositories: state
                .repo_states
                .values()
                .map(|repo| RepositorySummary {
                    name: repo.name.clone(),
                    status: repo.status,
                    duration_seconds: repo.duration().as_secs_f64(),
                    error: repo.error.clone(),
                })
                .collect(),
        }
    }
}

impl From<&ServiceSnapshot> for ServiceStatusPayload {
    fn from(snap: &ServiceSnapshot) -> Self {
        Self {
            name: snap.name.clone(),
            status: snap.state,
            pid: snap.pid,
            uptime_seconds: snap.uptime().map(|d| d.as_secs_f64()),
            error: snap.error.clone(),
        }
    }
}

impl From<&LogEntry> for LogPayload {
    fn from(entry: &LogEntry) -> Self {
        Self {
            service_name: entry.service_name.clone(),
            timestamp: entry.timestamp.to_rfc3339(),
            line: entry.line.clone(),
            stream: entry.stream,
        }
    }
}

impl From<ProgressEvent> for ProgressPayload {
    fn from(ev: ProgressEvent) -> Self {
        Self {
            repo_name: ev.repo,
            status: ev.status,
            message: ev.message,
        }
    }
}

impl Reply {
    pub fn error(err: &WillowcalError) -> Self {
        Reply::Error(ErrorPayload {
            message: err.to_string(),
            code: Some(err.code().to_string()),
        })
    }
}

/// A message body plus its optional correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub id: Option<String>,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(id: Option<String>, body: T) -> Self {
        Self { id, body }
    }
}

/// Parse one JSON message, splitting off `id` before decoding the body.
pub fn decode<T: for<'de> Deserialize<'de>>(text: &str) -> Result<Envelope<T>> {
    let mut value: Value = serde_json::from_str(text)?;
    let id = match value.as_object_mut().and_then(|obj| obj.remove("id")) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };
    let body = serde_json::from_value(value)?;
    Ok(Envelope { id, body })
}

/// Serialize one message, placing `id` beside `type` and `payload`.
pub fn encode<T: Serialize>(envelope: &Envelope<T>) -> Result<String> {
    let mut value = serde_json::to_value(&envelope.body)?;
    if let (Some(id), Some(obj)) = (&envelope.id, value.as_object_mut()) {
        obj.insert("id".to_string(), Value::String(id.clone()));
    }
    Ok(serde_json::to_string(&value)?)
}

/// Dispatches requests onto one orchestrator and one supervisor.
pub struct ControlHandler {
    orchestrator: Arc<Orchestrator>,
    supervisor: Supervisor,
    jobs: Vec<RepositoryJob>,
}

impl ControlHandler {
    pub fn new(orchestrator: Arc<Orchestrator>, supervisor: Supervisor, workspace: &Workspace) -> Self {
        Self {
            orchestrator,
            supervisor,
            jobs: workspace.repositories().to_vec(),
        }
    }

    /// Handle one decoded request; every reply carries the request's id.
    pub async fn handle(&self, request: Envelope<Request>) -> Vec<Envelope<Reply>> {
        let Envelope { id, body } = request;
        debug!(?id, request = ?body, "handling control request");

        let replies = match body {
            Request::InitStart => {
                let state = self.orchestrator.execute(self.jobs.clone()).await;
                vec![Reply::InitComplete(InitCompletePayload::from(&state))]
            }
            Request::ServiceList => {
                let services = self
                    .supervisor
                    .all_statuses()
                    .await
                    .into_iter()
                    .filter_map(|snap| {
                        let desc = snap.descriptor?;
                        Some(ServiceInfo {
                            name: desc.name,
                            repository: desc.repository_name,
                            run_command: desc.run_command,
                            status: snap.state,
                        })
                    })
                    .collect();
                vec![Reply::ServiceList(ServiceListPayload { services })]
            }
            Request::ServiceStart(target) => match self.supervisor.start(&target.service_name).await {
                Ok(()) => vec![Reply::ServiceStarted(target)],
                Err(e) => vec![Reply::error(&e)],
            },
            Request::ServiceStop(target) => match self.supervisor.stop(&target.service_name).await {
                Ok(()) => vec![Reply::ServiceStopped(target)],
                Err(e) => vec![Reply::error(&e)],
            },
            Request::ServiceStatus(query) => {
                match query.service_name.filter(|name| !name.is_empty()) {
                    Some(name) => match self.supervisor.status(&name).await {
                        Ok(snap) => vec![Reply::ServiceStatus(ServiceStatusListPayload {
                            services: vec![ServiceStatusPayload::from(&snap)],
                        })],
                        Err(e) => vec![Reply::error(&e)],
                    },
                    None => {
                        let services = self
                            .supervisor
                            .all_statuses()
                            .await
                            .iter()
                            .map(ServiceStatusPayload::from)
                            .collect();
                        vec![Reply::ServiceStatus(ServiceStatusListPayload { services })]
                    }
                }
            }
        };

        replies
            .into_iter()
            .map(|body| Envelope::new(id.clone(), body))
            .collect()
    }

    /// Text in, text out. Undecodable input yields a single error reply.
    pub async fn handle_text(&self, text: &str) -> Vec<String> {
        let replies = match decode::<Request>(text) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!(error = %e, "rejecting undecodable control message");
                vec![Envelope::new(None, Reply::error(&e))]
            }
        };

        replies
            .iter()
            .filter_map(|reply| match encode(reply) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(error = %e, "failed to encode control reply");
                    None
                }
            })
            .collect()
    }
}
