// src/exec/backend.rs

//! Pluggable collaborator abstractions for the orchestrator.
//!
//! The orchestrator talks to a [`CloneOperation`] and a [`CommandExecutor`]
//! instead of spawning processes itself. Production code uses
//! [`GitCloner`](super::git::GitCloner) and
//! [`ShellExecutor`](super::command::ShellExecutor); tests plug in fakes
//! that script outcomes and record calls without touching the OS.
//!
//! Both traits return outcomes as data. A failed clone or command is a
//! normal return value, never an `Err`.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::state::{CloneOutcome, CommandResult};

/// Boxed `Send` future, used so the traits stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Materialises a local working copy of a remote repository.
///
/// Must be idempotent: if `destination` already holds a working copy the
/// implementation reports success without cloning again.
pub trait CloneOperation: Send + Sync {
    fn clone_repository<'a>(
        &'a self,
        url: &'a str,
        destination: &'a Path,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CloneOutcome>;
}

/// Runs one shell command line to completion (or timeout / cancellation).
pub trait CommandExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        command: &'a str,
        working_dir: &'a Path,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CommandResult>;
}
