// src/config/mod.rs

//! Configuration loading and validation for willowcal.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants and collect every problem at once (`validate.rs`).
//! - Resolve the validated config into a [`Workspace`] the engines consume
//!   (`workspace.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;
pub mod workspace;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{
    ConfigFile, EngineSection, EngineSettings, RawConfigFile, RepositoryConfig, ServiceConfig,
};
pub use validate::validate_config;
pub use workspace::Workspace;
