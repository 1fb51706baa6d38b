//! Tests for the workflow executor.
//!
//! Everything runs against `MemoryStore` and `MockConnector`, so no
//! Postgres instance or network access is needed. Postgres-backed behaviour
//! is covered by the `db` crate.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use db::models::WorkflowRow;
use db::MemoryStore;
use nodes::mock::MockConnector;
use nodes::ConnectorRegistry;

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};
use crate::{
    breaker_key, EngineError, ExecutionStatus, Executor, ExecutorConfig, TriggerKind, Workflow,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Fixture {
    store: Arc<MemoryStore>,
    executor: Arc<Executor>,
}

fn fixture_with(connectors: Vec<(&str, Arc<MockConnector>)>, config: ExecutorConfig) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let mut registry = ConnectorRegistry::new();
    for (kind, connector) in connectors {
        registry.register(kind, connector);
    }
    let executor = Arc::new(Executor::new(
        store.clone(),
        Arc::new(registry),
        Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
        config,
    ));
    Fixture { store, executor }
}

fn fixture(kind: &str, connector: Arc<MockConnector>) -> Fixture {
    fixture_with(vec![(kind, connector)], ExecutorConfig::default())
}

/// Store a webhook workflow for `action_kind` and return it.
fn stored(store: &MemoryStore, action_kind: &str, config: Value) -> Workflow {
    let wf = Workflow::new("under-test", TriggerKind::Webhook, action_kind, config);
    store.insert_workflow(WorkflowRow::from(wf.clone()));
    wf
}

// ============================================================
// Real executions
// ============================================================

#[tokio::test]
async fn successful_run_is_logged_and_stamped() {
    let connector = Arc::new(MockConnector::succeeding("posted"));
    let fx = fixture("mock", connector.clone());
    let wf = stored(&fx.store, "mock", json!({ "text": "hi" }));

    let result = fx.executor.execute(&wf, CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(result.message, "posted");
    assert_eq!(result.data, Some(json!({ "echo": { "text": "hi" } })));

    let logs = fx.store.logs_for(wf.id);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, "success");
    assert!(fx.store.workflow(wf.id).unwrap().last_executed_at.is_some());
    assert_eq!(connector.call_count(), 1);
}

#[tokio::test]
async fn unknown_action_kind_fails_and_is_logged() {
    let fx = fixture("mock", Arc::new(MockConnector::succeeding("unused")));
    let wf = stored(&fx.store, "carrier-pigeon", json!({}));

    let result = fx.executor.execute(&wf, CancellationToken::new()).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.message.contains("carrier-pigeon"));
    let logs = fx.store.logs_for(wf.id);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, "failed");
    assert_eq!(logs[0].message, result.message);
}

#[tokio::test]
async fn malformed_configuration_fails_without_calling_connector() {
    let connector = Arc::new(MockConnector::succeeding("unused"));
    let fx = fixture("mock", connector.clone());
    let mut wf = Workflow::new("broken", TriggerKind::Webhook, "mock", json!({}));
    wf.config = "{\"text\": ".into();
    fx.store.insert_workflow(WorkflowRow::from(wf.clone()));

    let result = fx.executor.execute(&wf, CancellationToken::new()).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.message.contains("invalid configuration JSON"));
    assert_eq!(connector.call_count(), 0);
    assert_eq!(fx.store.logs_for(wf.id).len(), 1);
}

#[tokio::test]
async fn missing_credential_fails_without_calling_connector() {
    let connector = Arc::new(MockConnector::succeeding("unused").requiring("slack"));
    let fx = fixture("slack", connector.clone());
    let wf = stored(&fx.store, "slack", json!({}));

    let result = fx.executor.execute(&wf, CancellationToken::new()).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.message, "missing credential for service 'slack'");
    assert_eq!(connector.call_count(), 0);
}

#[tokio::test]
async fn owner_credential_is_handed_to_connector() {
    let connector = Arc::new(MockConnector::succeeding("posted").requiring("slack"));
    let fx = fixture("slack", connector.clone());
    let wf = stored(&fx.store, "slack", json!({}));
    fx.store
        .put_credential(wf.owner_id, "slack", "https://hooks.example/abc");

    let result = fx.executor.execute(&wf, CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(
        connector.last_credential().as_deref(),
        Some("https://hooks.example/abc")
    );
}

#[tokio::test(start_paused = true)]
async fn slow_action_times_out_as_failure() {
    let connector = Arc::new(MockConnector::hanging());
    let fx = fixture_with(
        vec![("mock", connector.clone())],
        ExecutorConfig::default().with_action_timeout(Duration::from_secs(2)),
    );
    let wf = stored(&fx.store, "mock", json!({}));

    let result = fx.executor.execute(&wf, CancellationToken::new()).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.message, "request timed out");
    let breaker = fx.executor.breakers().get(&breaker_key("mock", &wf.owner_id.to_string()));
    assert_eq!(breaker.failure_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn delayed_action_succeeds_inside_the_deadline_only() {
    let slow = Arc::new(
        MockConnector::succeeding("late but fine").with_delay(Duration::from_secs(1)),
    );
    let sluggish =
        Arc::new(MockConnector::succeeding("too late").with_delay(Duration::from_secs(10)));
    let fx = fixture_with(
        vec![("slow", slow.clone()), ("sluggish", sluggish.clone())],
        ExecutorConfig::default().with_action_timeout(Duration::from_secs(2)),
    );
    let within = stored(&fx.store, "slow", json!({}));
    let beyond = stored(&fx.store, "sluggish", json!({}));

    let result = fx.executor.execute(&within, CancellationToken::new()).await;
    assert!(result.is_success());
    assert_eq!(result.message, "late but fine");

    let result = fx.executor.execute(&beyond, CancellationToken::new()).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.message, "request timed out");
    assert_eq!(sluggish.call_count(), 1);
}

#[tokio::test]
async fn cancelled_run_is_logged_as_cancelled() {
    let connector = Arc::new(MockConnector::hanging());
    let fx = fixture("mock", connector.clone());
    let wf = stored(&fx.store, "mock", json!({}));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = fx.executor.execute(&wf, cancel).await;

    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert_eq!(fx.store.logs_for(wf.id)[0].status, "cancelled");
    let breaker = fx.executor.breakers().get(&breaker_key("mock", &wf.owner_id.to_string()));
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test]
async fn job_runs_the_workflow() {
    let connector = Arc::new(MockConnector::succeeding("queued"));
    let fx = fixture("mock", connector.clone());
    let wf = stored(&fx.store, "mock", json!({}));

    let job = fx.executor.job(wf.clone());
    assert_eq!(job.name(), format!("workflow:{}", wf.id));

    job.into_future(CancellationToken::new()).await;
    assert_eq!(connector.call_count(), 1);
    assert_eq!(fx.store.logs_for(wf.id).len(), 1);
}

// ============================================================
// Dry runs
// ============================================================

#[tokio::test]
async fn dry_run_leaves_no_trace() {
    let connector = Arc::new(MockConnector::succeeding("would post"));
    let fx = fixture("mock", connector.clone());
    let wf = stored(&fx.store, "mock", json!({ "text": "preview" }));

    let result = fx
        .executor
        .dry_run(&wf, wf.owner_id, "tenant-a")
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(connector.call_count(), 1);
    assert!(fx.store.logs().is_empty());
    assert_eq!(fx.store.workflow(wf.id).unwrap().last_executed_at, None);
}

#[tokio::test]
async fn dry_run_of_unstored_workflow_still_resolves_credentials() {
    let connector = Arc::new(MockConnector::succeeding("ok").requiring("discord"));
    let fx = fixture("discord", connector.clone());
    let owner = Uuid::new_v4();
    fx.store.put_credential(owner, "discord", "secret-url");

    let wf = Workflow::new("adhoc", TriggerKind::Webhook, "discord", json!({}));
    let result = fx.executor.dry_run(&wf, owner, "tenant-b").await.unwrap();

    assert!(result.is_success());
    assert_eq!(connector.last_credential().as_deref(), Some("secret-url"));
    assert!(fx.store.logs().is_empty());
}

// ============================================================
// Circuit breaking
// ============================================================

#[tokio::test]
async fn repeated_dependency_failures_open_the_circuit() {
    let connector = Arc::new(MockConnector::failing("503 from upstream"));
    let fx = fixture("mock", connector.clone());
    let wf = stored(&fx.store, "mock", json!({}));

    for _ in 0..5 {
        let result = fx.executor.execute(&wf, CancellationToken::new()).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.message, "request failed: 503 from upstream");
    }

    let key = breaker_key("mock", &wf.owner_id.to_string());
    assert_eq!(fx.executor.breakers().get(&key).state(), CircuitState::Open);

    // A real run is rejected without reaching the connector and still logged.
    let result = fx.executor.execute(&wf, CancellationToken::new()).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.message.contains("is open"));
    assert_eq!(connector.call_count(), 5);
    assert_eq!(fx.store.logs_for(wf.id).len(), 6);

    // A dry run surfaces the rejection as an error.
    let err = fx
        .executor
        .dry_run(&wf, wf.owner_id, &wf.owner_id.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CircuitOpen { key: k } if k == key));
    assert_eq!(connector.call_count(), 5);
}

#[tokio::test]
async fn configuration_errors_never_open_the_circuit() {
    let connector = Arc::new(MockConnector::rejecting_config("missing 'text'"));
    let fx = fixture("mock", connector.clone());
    let wf = stored(&fx.store, "mock", json!({}));

    for _ in 0..10 {
        let result = fx.executor.execute(&wf, CancellationToken::new()).await;
        assert_eq!(result.message, "invalid configuration: missing 'text'");
    }

    let key = breaker_key("mock", &wf.owner_id.to_string());
    let breaker = fx.executor.breakers().get(&key);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
    assert_eq!(connector.call_count(), 10);
}

#[tokio::test]
async fn breakers_are_isolated_per_tenant() {
    let connector = Arc::new(MockConnector::failing("down"));
    let fx = fixture("mock", connector.clone());
    let wf = stored(&fx.store, "mock", json!({}));

    for _ in 0..5 {
        let _ = fx.executor.dry_run(&wf, wf.owner_id, "noisy").await;
    }
    assert!(matches!(
        fx.executor.dry_run(&wf, wf.owner_id, "noisy").await,
        Err(EngineError::CircuitOpen { .. })
    ));

    // Another tenant using the same action kind is unaffected.
    let result = fx.executor.dry_run(&wf, wf.owner_id, "quiet").await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(
        fx.executor.breakers().get(&breaker_key("mock", "quiet")).state(),
        CircuitState::Closed
    );
}
