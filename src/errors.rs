// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Per-job and per-command failures are *data* (see [`crate::state`]) and
//! never surface here. This enum covers what is returned synchronously to a
//! caller: configuration problems, service start/stop rejections, and IO.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WillowcalError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Service already running: {0}")]
    ServiceAlreadyRunning(String),

    #[error("Service not running: {0}")]
    ServiceNotRunning(String),

    #[error("Failed to start service '{service}': {reason}")]
    SpawnFailed { service: String, reason: String },

    #[error("Initialization failed: {failed} of {total} repositories failed")]
    InitFailed { failed: usize, total: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WillowcalError {
    /// Short machine-readable code used on control-channel error replies.
    pub fn code(&self) -> &'static str {
        match self {
            WillowcalError::ConfigError(_) | WillowcalError::TomlError(_) => "config",
            WillowcalError::IoError(_) => "io",
            WillowcalError::JsonError(_) => "decode",
            WillowcalError::ServiceNotFound(_) => "service_not_found",
            WillowcalError::RepositoryNotFound(_) => "repository_not_found",
            WillowcalError::ServiceAlreadyRunning(_) => "already_running",
            WillowcalError::ServiceNotRunning(_) => "not_running",
            WillowcalError::SpawnFailed { .. } => "spawn_failed",
            WillowcalError::InitFailed { .. } => "init_failed",
            WillowcalError::Other(_) => "internal",
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, WillowcalError>;
