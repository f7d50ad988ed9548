// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Result, WillowcalError};
use crate::state::{RepositoryJob, ServiceDescriptor};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// version = "1.0"
/// workspace_dir = "./workspace"
///
/// [engine]
/// max_parallel_jobs = 5
/// command_timeout = "5m"
///
/// [[repositories]]
/// name = "api"
/// url = "https://github.com/acme/api.git"
/// path = "services/api"
/// setup_commands = ["npm ci"]
///
/// [[services]]
/// name = "api"
/// repo = "api"
/// run_command = "npm start"
/// ```
///
/// Every field defaults so that validation, not deserialization, reports
/// missing values (and reports all of them at once).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub workspace_dir: String,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// `[engine]` section: limits and timeouts for both engines.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_parallel_jobs")]
    pub max_parallel_jobs: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per setup-command (and per clone) limit, e.g. `"5m"`.
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,

    /// Wait after SIGTERM before a single `stop` force-kills.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    /// Shared wait used by `stop_all` during process-wide shutdown.
    #[serde(default = "default_shutdown_grace_period")]
    pub shutdown_grace_period: String,
}

fn default_max_parallel_jobs() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_command_timeout() -> String {
    "5m".to_string()
}

fn default_grace_period() -> String {
    "5s".to_string()
}

fn default_shutdown_grace_period() -> String {
    "2s".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_parallel_jobs: default_max_parallel_jobs(),
            max_retries: default_max_retries(),
            command_timeout: default_command_timeout(),
            grace_period: default_grace_period(),
            shutdown_grace_period: default_shutdown_grace_period(),
        }
    }
}

/// `[[repositories]]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub setup_commands: Vec<String>,
}

/// `[[services]]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub run_command: String,
}

/// Engine limits with durations already parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_parallel_jobs: usize,
    pub max_retries: u32,
    pub command_timeout: Duration,
    pub grace_period: Duration,
    pub shutdown_grace_period: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_parallel_jobs: default_max_parallel_jobs(),
            max_retries: default_max_retries(),
            command_timeout: Duration::from_secs(5 * 60),
            grace_period: Duration::from_secs(5),
            shutdown_grace_period: Duration::from_secs(2),
        }
    }
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`),
/// so holding one means every invariant has been checked: unique names,
/// well-formed URLs, services pointing at known repositories.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub version: String,
    pub workspace_dir: String,
    pub engine: EngineSettings,
    pub repositories: Vec<RepositoryJob>,
    pub services: Vec<ServiceDescriptor>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        version: String,
        workspace_dir: String,
        engine: EngineSettings,
        repositories: Vec<RepositoryJob>,
        services: Vec<ServiceDescriptor>,
    ) -> Self {
        Self {
            version,
            workspace_dir,
            engine,
            repositories,
            services,
        }
    }

    pub fn repository(&self, name: &str) -> Option<&RepositoryJob> {
        self.repositories.iter().find(|r| r.name == name)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    /// `workspace_dir`, resolved against the current directory if relative.
    pub fn absolute_workspace(&self) -> Result<PathBuf> {
        let dir = PathBuf::from(&self.workspace_dir);
        if dir.is_absolute() {
            return Ok(dir);
        }
        let cwd = std::env::current_dir().map_err(|e| {
            WillowcalError::ConfigError(format!("failed to get working directory: {e}"))
        })?;
        Ok(cwd.join(dir))
    }
}
