// src/supervisor/catalog.rs

use std::path::PathBuf;

use crate::state::ServiceDescriptor;

/// Configuration lookup the supervisor needs to start a service.
///
/// Implemented by [`Workspace`](crate::config::Workspace); tests can supply
/// any in-memory table.
pub trait ServiceCatalog: Send + Sync {
    /// Descriptor for `service_name`, if configured.
    fn descriptor(&self, service_name: &str) -> Option<ServiceDescriptor>;

    /// Every configured service, in configuration order.
    fn descriptors(&self) -> Vec<ServiceDescriptor>;

    /// Absolute working directory of `repository_name`.
    fn working_dir(&self, repository_name: &str) -> Option<PathBuf>;
}
