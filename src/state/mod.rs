// src/state/mod.rs

//! Shared data model read and mutated by the orchestrator and supervisor.
//!
//! - [`repo`] holds the repository job descriptor, per-attempt state and
//!   the aggregate execution state.
//! - [`service`] holds service descriptors, log entries and status
//!   snapshots.
//!
//! Nothing here has behaviour beyond bookkeeping; the owning engine decides
//! when transitions happen.

pub mod repo;
pub mod service;

pub use repo::{CloneOutcome, CommandResult, ExecutionState, RepoState, RepositoryJob};
pub use service::{LogEntry, ServiceDescriptor, ServiceSnapshot};
