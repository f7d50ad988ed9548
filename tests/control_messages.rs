// tests/control_messages.rs
#![cfg(unix)]

use std::error::Error;
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use willowcal::control::{decode, ControlHandler, Envelope, Reply, Request, ServiceRef};
use willowcal::orchestrator::{Orchestrator, OrchestratorOptions};
use willowcal::supervisor::{Supervisor, SupervisorOptions};
use willowcal::types::{RepoStatus, ServiceState};
use willowcal_test_utils::builders::WorkspaceBuilder;
use willowcal_test_utils::fakes::{FakeCloner, FakeCommandExecutor};
use willowcal_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn handler(dir: &TempDir) -> ControlHandler {
    let workspace = WorkspaceBuilder::new(dir.path())
        .with_service("api", "sleep 30")
        .build();

    let orchestrator = Orchestrator::new(
        Arc::new(FakeCloner::new()),
        Arc::new(FakeCommandExecutor::new()),
        dir.path(),
        OrchestratorOptions::default(),
    );
    let supervisor = Supervisor::new(
        Arc::new(workspace.clone()),
        SupervisorOptions::default(),
        CancellationToken::new(),
    );
    ControlHandler::new(Arc::new(orchestrator), supervisor, &workspace)
}

async fn single_reply(handler: &ControlHandler, text: &str) -> Result<Value, Box<dyn Error>> {
    let mut replies = with_timeout(handler.handle_text(text)).await;
    assert_eq!(replies.len(), 1);
    Ok(serde_json::from_str(&replies.remove(0))?)
}

#[tokio::test]
async fn init_start_reports_completion_with_id() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let h = handler(&dir);

    let reply = single_reply(&h, r#"{"id":"r1","type":"init.start"}"#).await?;

    assert_eq!(reply["id"], "r1");
    assert_eq!(reply["type"], "init.complete");
    assert_eq!(reply["payload"]["success_count"], 1);
    assert_eq!(reply["payload"]["failed_count"], 0);
    assert_eq!(reply["payload"]["repositories"][0]["name"], "api");
    assert_eq!(reply["payload"]["repositories"][0]["status"], RepoStatus::Success.as_str());
    assert!(reply["payload"]["repositories"][0].get("error").is_none());
    Ok(())
}

#[tokio::test]
async fn service_lifecycle_over_control_messages() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let h = handler(&dir);

    let started = h
        .handle(Envelope::new(
            Some("s".to_string()),
            Request::ServiceStart(ServiceRef {
                service_name: "api".to_string(),
            }),
        ))
        .await;
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].id.as_deref(), Some("s"));
    assert!(matches!(started[0].body, Reply::ServiceStarted(ref r) if r.service_name == "api"));

    let again = single_reply(&h, r#"{"type":"service.start","payload":{"service_name":"api"}}"#).await?;
    assert_eq!(again["type"], "error");
    assert_eq!(again["payload"]["code"], "already_running");

    let status = single_reply(&h, r#"{"type":"service.status","payload":{"service_name":"api"}}"#).await?;
    let svc = &status["payload"]["services"][0];
    assert_eq!(svc["status"], ServiceState::Running.as_str());
    assert!(svc["pid"].is_u64());
    assert!(svc["uptime_seconds"].is_f64());

    let list = single_reply(&h, r#"{"type":"service.list"}"#).await?;
    assert_eq!(list["payload"]["services"][0]["repository"], "api");
    assert_eq!(list["payload"]["services"][0]["run_command"], "sleep 30");

    let stopped = single_reply(&h, r#"{"type":"service.stop","payload":{"service_name":"api"}}"#).await?;
    assert_eq!(stopped["type"], "service.stopped");

    let all = single_reply(&h, r#"{"type":"service.status","payload":{}}"#).await?;
    assert_eq!(all["payload"]["services"][0]["status"], "stopped");
    assert!(all["payload"]["services"][0].get("pid").is_none());
    Ok(())
}

#[tokio::test]
async fn garbage_input_yields_decode_error() -> TestResult {
    let dir = TempDir::new()?;
    let h = handler(&dir);

    let reply = single_reply(&h, "not json").await?;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["code"], "decode");
    assert!(reply.get("id").is_none());

    assert!(decode::<Request>(r#"{"type":"service.start","payload":{}}"#).is_err());
    Ok(())
}
