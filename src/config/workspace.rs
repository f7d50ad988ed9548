// src/config/workspace.rs

use std::path::{Path, PathBuf};

use crate::config::model::ConfigFile;
use crate::errors::Result;
use crate::state::{RepositoryJob, ServiceDescriptor};
use crate::supervisor::ServiceCatalog;

/// Resolved, in-memory workspace: an absolute root plus the repository and
/// service descriptors that live under it.
///
/// This is what the engines consume; they never see configuration text.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    repositories: Vec<RepositoryJob>,
    services: Vec<ServiceDescriptor>,
}

impl Workspace {
    pub fn new(
        root: impl Into<PathBuf>,
        repositories: Vec<RepositoryJob>,
        services: Vec<ServiceDescriptor>,
    ) -> Self {
        Self {
            root: root.into(),
            repositories,
            services,
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Ok(Self::new(
            cfg.absolute_workspace()?,
            cfg.repositories.clone(),
            cfg.services.clone(),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repositories(&self) -> &[RepositoryJob] {
        &self.repositories
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn repository(&self, name: &str) -> Option<&RepositoryJob> {
        self.repositories.iter().find(|r| r.name == name)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Repositories referenced by at least one service, each listed once,
    /// in service order.
    pub fn service_repositories(&self) -> Vec<&RepositoryJob> {
        let mut seen = Vec::new();
        for svc in &self.services {
            if let Some(repo) = self.repository(&svc.repository_name) {
                if !seen.iter().any(|r: &&RepositoryJob| r.name == repo.name) {
                    seen.push(repo);
                }
            }
        }
        seen
    }
}

impl ServiceCatalog for Workspace {
    fn descriptor(&self, service_name: &str) -> Option<ServiceDescriptor> {
        self.service(service_name).cloned()
    }

    fn descriptors(&self) -> Vec<ServiceDescriptor> {
        self.services.clone()
    }

    fn working_dir(&self, repository_name: &str) -> Option<PathBuf> {
        self.repository(repository_name)
            .map(|repo| repo.resolve(&self.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Workspace {
        Workspace::new(
            "/work",
            vec![
                RepositoryJob::new("api", "https://x/api.git", "api"),
                RepositoryJob::new("web", "https://x/web.git", "apps/web"),
            ],
            vec![
                ServiceDescriptor::new("web", "web", "npm start"),
                ServiceDescriptor::new("api", "api", "cargo run"),
                ServiceDescriptor::new("worker", "api", "cargo run --bin worker"),
            ],
        )
    }

    #[test]
    fn resolves_working_dirs_under_root() {
        let ws = sample();
        assert_eq!(ws.working_dir("web"), Some(PathBuf::from("/work/apps/web")));
        assert_eq!(ws.working_dir("nope"), None);
    }

    #[test]
    fn service_repositories_are_deduplicated_in_service_order() {
        let ws = sample();
        let names: Vec<_> = ws
            .service_repositories()
            .into_iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["web", "api"]);
    }
}
