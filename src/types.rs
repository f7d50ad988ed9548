// src/types.rs

//! Small status enums shared by the state model, the engines and the
//! control messages. Their lowercase string forms are the wire values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of one repository job attempt.
///
/// Transitions strictly forward: `Pending -> Cloning -> SetupRunning ->
/// Success | Failed` (a failed clone goes straight to `Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    Pending,
    Cloning,
    SetupRunning,
    Success,
    Failed,
}

impl RepoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Pending => "pending",
            RepoStatus::Cloning => "cloning",
            RepoStatus::SetupRunning => "setup_running",
            RepoStatus::Success => "success",
            RepoStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RepoStatus::Success | RepoStatus::Failed)
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of one `execute` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supervisor state of a named service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Failed,
}

impl Default for ServiceState {
    fn default() -> Self {
        ServiceState::Stopped
    }
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Failed => "failed",
        }
    }

    /// `Starting` and `Running` both count as a live instance.
    pub fn is_live(&self) -> bool {
        matches!(self, ServiceState::Starting | ServiceState::Running)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stopped" => Ok(ServiceState::Stopped),
            "starting" => Ok(ServiceState::Starting),
            "running" => Ok(ServiceState::Running),
            "failed" => Ok(ServiceState::Failed),
            other => Err(format!(
                "invalid service state: {other} (expected stopped, starting, running or failed)"
            )),
        }
    }
}

/// Which pipe a log line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_status_wire_names() {
        assert_eq!(RepoStatus::SetupRunning.to_string(), "setup_running");
        let json = serde_json::to_string(&RepoStatus::SetupRunning).unwrap();
        assert_eq!(json, "\"setup_running\"");
        assert!(RepoStatus::Failed.is_terminal());
        assert!(!RepoStatus::Cloning.is_terminal());
    }

    #[test]
    fn service_state_parses_case_insensitively() {
        assert_eq!("Running".parse::<ServiceState>(), Ok(ServiceState::Running));
        assert_eq!(" stopped ".parse::<ServiceState>(), Ok(ServiceState::Stopped));
        assert!("paused".parse::<ServiceState>().is_err());
    }

    #[test]
    fn only_starting_and_running_are_live() {
        assert!(ServiceState::Starting.is_live());
        assert!(ServiceState::Running.is_live());
        assert!(!ServiceState::Stopped.is_live());
        assert!(!ServiceState::Failed.is_live());
    }
}
