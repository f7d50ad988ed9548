// src/config/validate.rs

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, EngineSection, EngineSettings, RawConfigFile, RepositoryConfig, ServiceConfig,
};
use crate::errors::{Result, WillowcalError};
use crate::state::{RepositoryJob, ServiceDescriptor};

pub const SUPPORTED_VERSION: &str = "1.0";

static GIT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://|git@|ssh://)\S+$").expect("static regex"));

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = WillowcalError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        let engine = engine_settings(&raw.engine).map_err(WillowcalError::ConfigError)?;

        let repositories = raw
            .repositories
            .into_iter()
            .map(|r| RepositoryJob::new(r.name, r.url, r.path).with_setup_commands(r.setup_commands))
            .collect();
        let services = raw
            .services
            .into_iter()
            .map(|s| ServiceDescriptor::new(s.name, s.repo, s.run_command))
            .collect();

        Ok(ConfigFile::new_unchecked(
            raw.version,
            raw.workspace_dir,
            engine,
            repositories,
            services,
        ))
    }
}

/// Check every invariant and report all violations in one error.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    let mut problems = Vec::new();

    if cfg.version != SUPPORTED_VERSION {
        problems.push(format!(
            "unsupported version: {:?} (expected: {SUPPORTED_VERSION})",
            cfg.version
        ));
    }

    if cfg.workspace_dir.trim().is_empty() {
        problems.push("workspace_dir cannot be empty".to_string());
    }

    if cfg.repositories.is_empty() {
        problems.push("at least one repository is required".to_string());
    }

    let mut repo_names = HashSet::new();
    for repo in &cfg.repositories {
        if !repo.name.is_empty() && !repo_names.insert(repo.name.as_str()) {
            problems.push(format!("duplicate repository name: {}", repo.name));
        }
        problems.extend(check_repository(repo));
    }

    let mut service_names = HashSet::new();
    for service in &cfg.services {
        if !service.name.is_empty() && !service_names.insert(service.name.as_str()) {
            problems.push(format!("duplicate service name: {}", service.name));
        }
        problems.extend(check_service(service));
        if !service.repo.is_empty() && !repo_names.contains(service.repo.as_str()) {
            problems.push(format!(
                "service '{}' references non-existent repository '{}'",
                service.name, service.repo
            ));
        }
    }

    if let Err(e) = engine_settings(&cfg.engine) {
        problems.push(e);
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(WillowcalError::ConfigError(format!(
            "config validation failed:\n  - {}",
            problems.join("\n  - ")
        )))
    }
}

fn check_repository(repo: &RepositoryConfig) -> Vec<String> {
    if repo.name.is_empty() {
        return vec!["repository name cannot be empty".to_string()];
    }

    let mut problems = Vec::new();
    if repo.url.is_empty() {
        problems.push(format!("repository '{}' must have a URL", repo.name));
    } else if !GIT_URL.is_match(&repo.url) {
        problems.push(format!(
            "repository '{}' has invalid git URL: {}",
            repo.name, repo.url
        ));
    }
    if repo.path.is_empty() {
        problems.push(format!("repository '{}' must have a path", repo.name));
    }
    problems
}

fn check_service(service: &ServiceConfig) -> Vec<String> {
    if service.name.is_empty() {
        return vec!["service name cannot be empty".to_string()];
    }

    let mut problems = Vec::new();
    if service.repo.is_empty() {
        problems.push(format!(
            "service '{}' must reference a repository",
            service.name
        ));
    }
    if service.run_command.trim().is_empty() {
        problems.push(format!("service '{}' must have a run_command", service.name));
    }
    problems
}

fn engine_settings(engine: &EngineSection) -> std::result::Result<EngineSettings, String> {
    if engine.max_parallel_jobs == 0 {
        return Err("[engine].max_parallel_jobs must be >= 1 (got 0)".to_string());
    }

    let field = |name: &str, value: &str| {
        parse_duration(value).map_err(|e| format!("[engine].{name}: {e}"))
    };

    Ok(EngineSettings {
        max_parallel_jobs: engine.max_parallel_jobs,
        max_retries: engine.max_retries,
        command_timeout: field("command_timeout", &engine.command_timeout)?,
        grace_period: field("grace_period", &engine.grace_period)?,
        shutdown_grace_period: field("shutdown_grace_period", &engine.shutdown_grace_period)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str, url: &str, path: &str) -> RepositoryConfig {
        RepositoryConfig {
            name: name.to_string(),
            url: url.to_string(),
            path: path.to_string(),
            setup_commands: vec![],
        }
    }

    #[test]
    fn accepts_supported_url_schemes() {
        for url in [
            "https://github.com/acme/api.git",
            "http://git.local/api",
            "git@github.com:acme/api.git",
            "ssh://git@host/acme/api.git",
        ] {
            assert!(check_repository(&repo("api", url, "api")).is_empty(), "{url}");
        }
        assert_eq!(check_repository(&repo("api", "ftp://host/api", "api")).len(), 1);
    }

    #[test]
    fn collects_every_problem() {
        let raw = RawConfigFile {
            version: "2.0".to_string(),
            workspace_dir: String::new(),
            repositories: vec![repo("api", "", ""), repo("api", "https://x/y", "y")],
            services: vec![ServiceConfig {
                name: "web".to_string(),
                repo: "missing".to_string(),
                run_command: String::new(),
            }],
            ..Default::default()
        };

        let err = validate_config(&raw).unwrap_err().to_string();
        assert!(err.contains("unsupported version"));
        assert!(err.contains("workspace_dir cannot be empty"));
        assert!(err.contains("must have a URL"));
        assert!(err.contains("must have a path"));
        assert!(err.contains("duplicate repository name: api"));
        assert!(err.contains("must have a run_command"));
        assert!(err.contains("non-existent repository 'missing'"));
    }

    #[test]
    fn engine_durations_are_parsed() {
        let mut engine = EngineSection::default();
        engine.command_timeout = "90s".to_string();
        let settings = engine_settings(&engine).unwrap();
        assert_eq!(settings.command_timeout.as_secs(), 90);
        assert_eq!(settings.grace_period.as_secs(), 5);

        engine.grace_period = "soon".to_string();
        assert!(engine_settings(&engine).unwrap_err().contains("grace_period"));
    }
}
