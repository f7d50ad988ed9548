// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running external commands using
//! `tokio::process::Command`:
//!
//! - [`backend`] defines the `CloneOperation` / `CommandExecutor` traits the
//!   orchestrator consumes, which tests replace with fakes.
//! - [`command`] builds shell commands and provides `ShellExecutor`, the
//!   production setup-command runner with timeout and cancellation.
//! - [`git`] provides `GitCloner`, the production clone operation.
//! - [`signal`] sends graceful / forced termination to supervised process
//!   groups.

pub mod backend;
pub mod command;
pub mod git;
pub mod signal;

pub use backend::{BoxFuture, CloneOperation, CommandExecutor};
pub use command::{shell_command, ShellExecutor, DEFAULT_COMMAND_TIMEOUT};
pub use git::{is_working_copy, GitCloner};
