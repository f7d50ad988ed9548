#![allow(dead_code)]

use std::path::Path;

use willowcal::config::{parse_str, ConfigFile, Workspace};
use willowcal::state::{RepositoryJob, ServiceDescriptor};

/// Builder for `RepositoryJob` with a placeholder https URL and a path equal
/// to the name.
pub struct JobBuilder {
    job: RepositoryJob,
}

impl JobBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            job: RepositoryJob::new(name, format!("https://example.com/{name}.git"), name),
        }
    }

    pub fn url(mut self, url: &str) -> Self {
        self.job.source_url = url.to_string();
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.job.destination_path = path.into();
        self
    }

    pub fn setup(mut self, cmd: &str) -> Self {
        self.job.setup_commands.push(cmd.to_string());
        self
    }

    pub fn build(self) -> RepositoryJob {
        self.job
    }
}

/// `n` jobs named `repo_0 .. repo_{n-1}`, no setup commands.
pub fn jobs(n: usize) -> Vec<RepositoryJob> {
    (0..n).map(|i| JobBuilder::new(&format!("repo_{i}")).build()).collect()
}

/// Builder for `Workspace` rooted at an existing directory.
pub struct WorkspaceBuilder {
    root: std::path::PathBuf,
    repositories: Vec<RepositoryJob>,
    services: Vec<ServiceDescriptor>,
}

impl WorkspaceBuilder {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            repositories: vec![],
            services: vec![],
        }
    }

    pub fn with_repository(mut self, job: RepositoryJob) -> Self {
        self.repositories.push(job);
        self
    }

    /// Adds the service and, if missing, a repository of the same name.
    /// The repository's directory is created so the service can run in it.
    pub fn with_service(mut self, name: &str, run_command: &str) -> Self {
        if !self.repositories.iter().any(|r| r.name == name) {
            self.repositories.push(JobBuilder::new(name).build());
        }
        std::fs::create_dir_all(self.root.join(name)).expect("create service working dir");
        self.services
            .push(ServiceDescriptor::new(name, name, run_command));
        self
    }

    pub fn build(self) -> Workspace {
        Workspace::new(self.root, self.repositories, self.services)
    }
}

/// Builder for configuration TOML text.
pub struct ConfigTomlBuilder {
    workspace_dir: String,
    engine: Vec<String>,
    repositories: Vec<String>,
    services: Vec<String>,
}

impl ConfigTomlBuilder {
    pub fn new(workspace_dir: &str) -> Self {
        Self {
            workspace_dir: workspace_dir.to_string(),
            engine: vec![],
            repositories: vec![],
            services: vec![],
        }
    }

    /// Raw `key = value` line for the `[engine]` section.
    pub fn engine(mut self, line: &str) -> Self {
        self.engine.push(line.to_string());
        self
    }

    pub fn repository(mut self, name: &str, url: &str, path: &str, setup: &[&str]) -> Self {
        let setup = setup
            .iter()
            .map(|c| format!("{c:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.repositories.push(format!(
            "[[repositories]]\nname = {name:?}\nurl = {url:?}\npath = {path:?}\nsetup_commands = [{setup}]\n"
        ));
        self
    }

    pub fn service(mut self, name: &str, repo: &str, run_command: &str) -> Self {
        self.services.push(format!(
            "[[services]]\nname = {name:?}\nrepo = {repo:?}\nrun_command = {run_command:?}\n"
        ));
        self
    }

    pub fn build_toml(&self) -> String {
        let mut out = format!("version = \"1.0\"\nworkspace_dir = {:?}\n\n", self.workspace_dir);
        if !self.engine.is_empty() {
            out.push_str("[engine]\n");
            for line in &self.engine {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        for block in self.repositories.iter().chain(&self.services) {
            out.push_str(block);
            out.push('\n');
        }
        out
    }

    pub fn build(&self) -> ConfigFile {
        let raw = parse_str(&self.build_toml()).expect("builder produced invalid TOML");
        ConfigFile::try_from(raw).expect("Failed to build valid config from builder")
    }
}
