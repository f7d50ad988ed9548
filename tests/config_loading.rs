// tests/config_loading.rs

use std::error::Error;
use std::time::Duration;

use tempfile::TempDir;

use willowcal::config::{load_and_validate, load_from_path, Workspace};
use willowcal::errors::WillowcalError;
use willowcal::supervisor::ServiceCatalog;
use willowcal_test_utils::builders::ConfigTomlBuilder;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn loads_full_config_from_disk() -> TestResult {
    let dir = TempDir::new()?;
    let ws_dir = dir.path().join("ws");
    let toml = ConfigTomlBuilder::new(&ws_dir.to_string_lossy())
        .engine("max_parallel_jobs = 2")
        .engine("command_timeout = \"90s\"")
        .repository(
            "api",
            "git@github.com:acme/api.git",
            "services/api",
            &["npm ci", "npm run build"],
        )
        .repository("web", "https://github.com/acme/web.git", "web", &[])
        .service("api", "api", "npm start")
        .build_toml();
    let path = dir.path().join("Willowcal.toml");
    std::fs::write(&path, toml)?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.engine.max_parallel_jobs, 2);
    assert_eq!(cfg.engine.max_retries, 3);
    assert_eq!(cfg.engine.command_timeout, Duration::from_secs(90));
    assert_eq!(cfg.engine.grace_period, Duration::from_secs(5));
    assert_eq!(cfg.repositories[0].setup_commands, vec!["npm ci", "npm run build"]);

    let ws = Workspace::from_config(&cfg)?;
    assert_eq!(ws.root(), ws_dir.as_path());
    assert_eq!(ws.working_dir("api"), Some(ws_dir.join("services/api")));
    assert_eq!(ws.descriptor("api").map(|d| d.run_command), Some("npm start".to_string()));
    Ok(())
}

#[test]
fn missing_file_is_a_config_error() {
    let err = load_from_path("/definitely/not/here/Willowcal.toml").unwrap_err();
    assert!(matches!(err, WillowcalError::ConfigError(ref m) if m.contains("not found")));
}

#[test]
fn malformed_toml_is_reported() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "version = \"1.0\"\n[[repositories]\nname = ")?;

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, WillowcalError::TomlError(_)));
    Ok(())
}

#[test]
fn invalid_config_lists_every_problem() -> TestResult {
    let dir = TempDir::new()?;
    let toml = ConfigTomlBuilder::new("./ws")
        .engine("max_parallel_jobs = 0")
        .repository("api", "ftp://nope/api", "api", &[])
        .service("web", "frontend", "npm start")
        .build_toml();
    let path = dir.path().join("Willowcal.toml");
    std::fs::write(&path, toml)?;

    let msg = load_and_validate(&path).unwrap_err().to_string();
    assert!(msg.contains("invalid git URL"));
    assert!(msg.contains("non-existent repository 'frontend'"));
    assert!(msg.contains("max_parallel_jobs"));
    Ok(())
}

#[test]
fn relative_workspace_resolves_against_cwd() -> TestResult {
    let cfg = ConfigTomlBuilder::new("./ws")
        .repository("api", "https://x.test/api.git", "api", &[])
        .build();
    let root = cfg.absolute_workspace()?;
    assert!(root.is_absolute());
    assert!(root.ends_with("ws"));
    Ok(())
}
