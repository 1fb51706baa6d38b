//! Workflow execution.
//!
//! `Executor` runs one workflow's action:
//! 1. Stamps `last_executed_at` (only for real runs, before dispatch).
//! 2. Parses the stored JSON configuration.
//! 3. Looks up the connector for `action_kind`.
//! 4. Resolves the owner's credential if the connector needs one.
//! 5. Invokes the connector through the circuit breaker for
//!    `action_kind:tenant`, under the action timeout.
//! 6. Records the outcome as a log row (only for real runs).
//!
//! Every failure along the way becomes a `Failed` [`ExecutionResult`]; the
//! only error a caller can see is a circuit-open rejection on a dry run.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use db::Store;
use nodes::{ConnectorContext, ConnectorError, ConnectorRegistry};
use queue::Job;

use crate::circuit_breaker::{BreakerError, CircuitBreakerRegistry};
use crate::{EngineError, ExecutionResult, ExecutionStatus, Workflow};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Deadline for a single connector call.
    pub action_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl ExecutorConfig {
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }
}

/// Breaker key for `action_kind` on behalf of `tenant`.
pub fn breaker_key(action_kind: &str, tenant: &str) -> String {
    format!("{action_kind}:{tenant}")
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    store: Arc<dyn Store>,
    connectors: Arc<ConnectorRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        store: Arc<dyn Store>,
        connectors: Arc<ConnectorRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            connectors,
            breakers,
            config,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Run `workflow` for real: bookkeeping, dispatch, log row.
    ///
    /// Never fails; the outcome is returned for callers that want it and is
    /// always persisted.
    #[instrument(skip_all, fields(workflow_id = %workflow.id, action_kind = %workflow.action_kind))]
    pub async fn execute(&self, workflow: &Workflow, cancel: CancellationToken) -> ExecutionResult {
        if let Err(e) = self
            .store
            .update_workflow_last_executed(workflow.id, Utc::now())
            .await
        {
            warn!(error = %e, "could not stamp last_executed_at");
        }

        let tenant = workflow.owner_id.to_string();
        let result = match self.dispatch(workflow, workflow.owner_id, &tenant, cancel).await {
            Ok(result) => result,
            Err(e) => ExecutionResult::failed(e.to_string(), Duration::ZERO),
        };

        match result.status {
            ExecutionStatus::Success => info!(duration = ?result.duration, "workflow executed"),
            _ => warn!(status = %result.status, message = %result.message, "workflow execution did not succeed"),
        }

        if let Err(e) = self
            .store
            .create_log(workflow.id, result.status.as_str(), &result.message)
            .await
        {
            error!(error = %e, "could not persist execution log");
        }

        result
    }

    /// Run the action without touching `last_executed_at` or the log table.
    ///
    /// Credentials are still read from the store.
    ///
    /// # Errors
    /// [`EngineError::CircuitOpen`] if the dependency's breaker rejected the
    /// call; every other failure is a `Failed` result.
    #[instrument(skip_all, fields(action_kind = %workflow.action_kind, tenant = %tenant_id))]
    pub async fn dry_run(
        &self,
        workflow: &Workflow,
        owner_id: Uuid,
        tenant_id: &str,
    ) -> Result<ExecutionResult, EngineError> {
        self.dispatch(workflow, owner_id, tenant_id, CancellationToken::new())
            .await
    }

    /// A pool job that runs [`Executor::execute`] for `workflow`.
    pub fn job(self: &Arc<Self>, workflow: Workflow) -> Job {
        let executor = Arc::clone(self);
        Job::new(format!("workflow:{}", workflow.id), move |cancel| async move {
            executor.execute(&workflow, cancel).await;
        })
    }

    async fn dispatch(
        &self,
        workflow: &Workflow,
        owner_id: Uuid,
        tenant: &str,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let started = Instant::now();

        let config: Value = match serde_json::from_str(&workflow.config) {
            Ok(config) => config,
            Err(e) => {
                return Ok(ExecutionResult::failed(
                    format!("invalid configuration JSON: {e}"),
                    started.elapsed(),
                ))
            }
        };

        let Some(connector) = self.connectors.get(&workflow.action_kind) else {
            return Ok(ExecutionResult::failed(
                format!("unknown action kind '{}'", workflow.action_kind),
                started.elapsed(),
            ));
        };

        let mut ctx = ConnectorContext::new(workflow.id, owner_id).with_cancel(cancel);
        if let Some(service) = connector.required_service() {
            match self.store.get_credential(owner_id, service).await {
                Ok(Some(secret)) => ctx.credential = Some(secret),
                Ok(None) => {
                    return Ok(ExecutionResult::failed(
                        format!("missing credential for service '{service}'"),
                        started.elapsed(),
                    ))
                }
                Err(e) => {
                    return Ok(ExecutionResult::failed(
                        format!("could not load credential for service '{service}': {e}"),
                        started.elapsed(),
                    ))
                }
            }
        }

        let breaker = self.breakers.get(&breaker_key(&workflow.action_kind, tenant));
        let timeout = self.config.action_timeout;
        let outcome = breaker
            .call_counting(
                || async {
                    match tokio::time::timeout(timeout, connector.execute(&ctx, &config)).await {
                        Ok(res) => res,
                        Err(_) => {
                            ctx.cancel.cancel();
                            Err(ConnectorError::Timeout)
                        }
                    }
                },
                ConnectorError::is_dependency_failure,
            )
            .await;

        let elapsed = started.elapsed();
        match outcome {
            Ok(output) => Ok(ExecutionResult::success(output.message, output.data, elapsed)),
            Err(BreakerError::Open { key }) => Err(EngineError::CircuitOpen { key }),
            Err(BreakerError::Inner(ConnectorError::Cancelled)) => Ok(ExecutionResult::cancelled(
                "execution cancelled before the action completed",
                elapsed,
            )),
            Err(BreakerError::Inner(e)) => Ok(ExecutionResult::failed(e.to_string(), elapsed)),
        }
    }
}
