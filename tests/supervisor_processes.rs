// tests/supervisor_processes.rs
#![cfg(unix)]

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use willowcal::errors::WillowcalError;
use willowcal::supervisor::{Supervisor, SupervisorOptions};
use willowcal::types::{LogStream, ServiceState};
use willowcal_test_utils::builders::WorkspaceBuilder;
use willowcal_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn supervisor(dir: &TempDir, services: &[(&str, &str)], options: SupervisorOptions) -> Supervisor {
    let mut builder = WorkspaceBuilder::new(dir.path());
    for (name, cmd) in services {
        builder = builder.with_service(name, cmd);
    }
    Supervisor::new(Arc::new(builder.build()), options, CancellationToken::new())
}

async fn wait_for_state(sup: &Supervisor, name: &str, want: ServiceState) -> TestResult {
    with_timeout(async {
        loop {
            if sup.status(name).await?.state == want {
                return Ok::<_, WillowcalError>(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn second_start_is_rejected_and_spawns_nothing() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let sup = supervisor(&dir, &[("sleeper", "sleep 30")], SupervisorOptions::default());

    sup.start("sleeper").await?;
    let first = sup.status("sleeper").await?;
    assert_eq!(first.state, ServiceState::Running);
    assert!(first.pid.is_some());

    let err = sup.start("sleeper").await.unwrap_err();
    assert!(matches!(err, WillowcalError::ServiceAlreadyRunning(_)));
    assert_eq!(sup.status("sleeper").await?.pid, first.pid);

    sup.stop("sleeper").await?;
    assert_eq!(sup.status("sleeper").await?.state, ServiceState::Stopped);
    Ok(())
}

#[tokio::test]
async fn clean_exit_is_stopped_and_nonzero_exit_is_failed() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let sup = supervisor(
        &dir,
        &[("oneshot", "echo done"), ("crasher", "echo oops >&2; exit 3")],
        SupervisorOptions::default(),
    );

    sup.start("oneshot").await?;
    sup.start("crasher").await?;

    wait_for_state(&sup, "oneshot", ServiceState::Stopped).await?;
    wait_for_state(&sup, "crasher", ServiceState::Failed).await?;

    let crashed = sup.status("crasher").await?;
    assert!(crashed.error.as_deref().unwrap_or("").contains('3'));
    assert!(crashed.pid.is_none());
    assert!(sup.status("oneshot").await?.error.is_none());

    // A failed service can be started again.
    sup.start("crasher").await?;
    wait_for_state(&sup, "crasher", ServiceState::Failed).await?;
    Ok(())
}

#[tokio::test]
async fn stop_force_kills_after_grace_period() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let grace = Duration::from_millis(300);
    let sup = supervisor(
        &dir,
        &[("stubborn", "trap '' TERM; echo ready; while true; do sleep 1; done")],
        SupervisorOptions {
            grace_period: grace,
            ..SupervisorOptions::default()
        },
    );

    let mut logs = sup.subscribe();
    sup.start("stubborn").await?;
    // Wait until the trap is installed.
    with_timeout(logs.recv()).await;

    let started = Instant::now();
    sup.stop("stubborn").await?;
    let elapsed = started.elapsed();

    assert!(elapsed >= grace);
    assert!(elapsed < grace + Duration::from_secs(2), "stop took {elapsed:?}");
    assert_eq!(sup.status("stubborn").await?.state, ServiceState::Stopped);
    Ok(())
}

#[tokio::test]
async fn stop_requires_running_service() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let sup = supervisor(&dir, &[("idle", "sleep 30")], SupervisorOptions::default());

    assert!(matches!(
        sup.stop("idle").await.unwrap_err(),
        WillowcalError::ServiceNotRunning(_)
    ));
    assert!(matches!(
        sup.stop("ghost").await.unwrap_err(),
        WillowcalError::ServiceNotFound(_)
    ));
    assert!(matches!(
        sup.start("ghost").await.unwrap_err(),
        WillowcalError::ServiceNotFound(_)
    ));

    let never_started = sup.status("idle").await?;
    assert_eq!(never_started.state, ServiceState::Stopped);
    assert!(never_started.uptime().is_none());
    Ok(())
}

#[tokio::test]
async fn spawn_failure_registers_nothing() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let sup = supervisor(&dir, &[("broken", "true")], SupervisorOptions::default());
    std::fs::remove_dir_all(dir.path().join("broken"))?;

    let err = sup.start("broken").await.unwrap_err();
    assert!(matches!(err, WillowcalError::SpawnFailed { .. }));
    assert_eq!(sup.status("broken").await?.state, ServiceState::Stopped);
    assert_eq!(sup.live_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn log_entries_carry_stream_and_instance_queue_closes_on_exit() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let sup = supervisor(
        &dir,
        &[("chatty", "echo to-out; echo to-err >&2; sleep 0.2")],
        SupervisorOptions::default(),
    );

    let mut global = sup.subscribe();
    sup.start("chatty").await?;
    let mut instance = sup
        .take_instance_logs("chatty")
        .await
        .ok_or("instance logs already taken")?;
    assert!(sup.take_instance_logs("chatty").await.is_none());

    let mut seen = Vec::new();
    while let Some(entry) = with_timeout(instance.recv()).await {
        assert_eq!(entry.service_name, "chatty");
        seen.push((entry.line, entry.stream));
    }
    seen.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        seen,
        vec![
            ("to-err".to_string(), LogStream::Stderr),
            ("to-out".to_string(), LogStream::Stdout),
        ]
    );

    let first = with_timeout(global.recv()).await.ok_or("global stream closed")?;
    assert_eq!(first.service_name, "chatty");
    Ok(())
}

#[tokio::test]
async fn flooding_full_queues_never_blocks_the_process() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let sup = supervisor(
        &dir,
        &[("flood", "i=0; while [ $i -lt 5000 ]; do echo line $i; i=$((i+1)); done")],
        SupervisorOptions::default(),
    );

    // Subscribed but never read: fills at 1,000 entries.
    let _idle_subscriber = sup.subscribe();
    sup.start("flood").await?;

    wait_for_state(&sup, "flood", ServiceState::Stopped).await?;

    let mut instance = sup.take_instance_logs("flood").await.ok_or("no instance logs")?;
    let mut received = 0usize;
    while with_timeout(instance.recv()).await.is_some() {
        received += 1;
    }
    assert_eq!(received, 100);
    Ok(())
}

#[tokio::test]
async fn stop_all_uses_one_shared_grace_period() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let stubborn = "trap '' TERM; echo ready; while true; do sleep 1; done";
    let sup = supervisor(
        &dir,
        &[("one", stubborn), ("two", stubborn), ("polite", "sleep 30")],
        SupervisorOptions {
            shutdown_grace_period: Duration::from_millis(300),
            ..SupervisorOptions::default()
        },
    );

    let mut logs = sup.subscribe();
    for name in ["one", "two", "polite"] {
        sup.start(name).await?;
    }
    for _ in 0..2 {
        with_timeout(logs.recv()).await;
    }

    let started = Instant::now();
    sup.stop_all().await;
    let elapsed = started.elapsed();

    // Two stragglers, but only one grace period.
    assert!(elapsed < Duration::from_millis(300) * 2 + Duration::from_secs(1), "stop_all took {elapsed:?}");
    for snap in sup.all_statuses().await {
        assert_eq!(snap.state, ServiceState::Stopped, "{}", snap.name);
    }
    assert_eq!(sup.live_count().await, 0);
    Ok(())
}
