// tests/shell_executor.rs
#![cfg(unix)]

use std::error::Error;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use willowcal::exec::{CloneOperation, CommandExecutor, GitCloner, ShellExecutor};
use willowcal_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn captures_output_and_honours_shell_operators() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let exec = ShellExecutor::default();
    let cancel = CancellationToken::new();

    let result = exec
        .execute("echo hello && echo warn >&2 | cat; pwd", dir.path(), &cancel)
        .await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.starts_with("hello\n"));
    assert_eq!(result.stderr.trim(), "warn");
    let leaf = dir.path().file_name().ok_or("temp dir has no name")?;
    assert!(result.stdout.trim_end().ends_with(leaf.to_string_lossy().as_ref()));
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_is_a_failure_with_code() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let exec = ShellExecutor::default();

    let result = exec
        .execute("echo partial; exit 7", dir.path(), &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.exit_code, 7);
    assert_eq!(result.stdout, "partial\n");
    assert!(result.error.is_some());
    Ok(())
}

#[tokio::test]
async fn timeout_reports_minus_one() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let exec = ShellExecutor::new(Duration::from_millis(200));

    let result = with_timeout(exec.execute("sleep 10", dir.path(), &CancellationToken::new())).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, -1);
    assert!(result.error.as_deref().unwrap_or("").contains("timeout"));
    assert!(result.duration < Duration::from_secs(5));
    Ok(())
}

#[tokio::test]
async fn cancellation_kills_running_command() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let exec = ShellExecutor::default();
    let cancel = CancellationToken::new();

    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        })
    };

    let result = with_timeout(exec.execute("sleep 10", dir.path(), &cancel)).await;
    trigger.await?;

    assert_eq!(result.exit_code, -1);
    assert_eq!(result.error.as_deref(), Some("command cancelled"));
    Ok(())
}

#[tokio::test]
async fn timeout_kills_processes_forked_by_the_shell() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let exec = ShellExecutor::new(Duration::from_millis(200));

    let result = with_timeout(exec.execute(
        "(sleep 1; touch leaked); true",
        dir.path(),
        &CancellationToken::new(),
    ))
    .await;
    assert_eq!(result.exit_code, -1);

    tokio::time::sleep(Duration::from_millis(1800)).await;
    assert!(!dir.path().join("leaked").exists());
    Ok(())
}

#[tokio::test]
async fn cancellation_kills_processes_forked_by_the_shell() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let exec = ShellExecutor::default();
    let cancel = CancellationToken::new();

    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        })
    };

    let result = with_timeout(exec.execute("(sleep 1; touch leaked); true", dir.path(), &cancel)).await;
    trigger.await?;
    assert_eq!(result.error.as_deref(), Some("command cancelled"));

    tokio::time::sleep(Duration::from_millis(1800)).await;
    assert!(!dir.path().join("leaked").exists());
    Ok(())
}

#[tokio::test]
async fn empty_command_fails_without_spawning() -> TestResult {
    let dir = TempDir::new()?;
    let result = ShellExecutor::default()
        .execute("   ", dir.path(), &CancellationToken::new())
        .await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("empty command"));
    Ok(())
}

#[tokio::test]
async fn git_clone_is_skipped_for_existing_working_copy() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let dest = dir.path().join("api");
    std::fs::create_dir_all(dest.join(".git"))?;

    let outcome = GitCloner::default()
        .clone_repository(
            "https://example.invalid/api.git",
            &dest,
            &CancellationToken::new(),
        )
        .await;

    assert!(outcome.success);
    assert!(outcome.skipped);
    assert!(outcome.output.contains("skipping clone"));
    Ok(())
}
