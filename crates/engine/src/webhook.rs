//! Webhook-triggered dispatch.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use db::Store;
use queue::{JobQueue, QueueError};

use crate::{EngineError, Executor, TriggerKind, Workflow};

/// Acknowledgement returned to the webhook caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub workflow_id: Uuid,
    /// False when the pool was saturated and the job was dropped.
    pub queued: bool,
}

/// Validate workflow `id` for a webhook trigger and hand it to `queue`.
///
/// The caller is acknowledged as soon as the job is submitted; the action
/// runs in the background. A full queue is not an error for the caller.
///
/// # Errors
/// `WorkflowNotFound`, `WorkflowInactive` or `WrongTrigger` for workflows
/// that cannot be triggered this way; `Database` on lookup failure.
#[instrument(skip(store, executor, queue))]
pub async fn dispatch_webhook(
    store: &dyn Store,
    executor: &Arc<Executor>,
    queue: &dyn JobQueue,
    id: Uuid,
) -> Result<WebhookAck, EngineError> {
    let row = store
        .get_workflow_by_id(id)
        .await?
        .ok_or(EngineError::WorkflowNotFound(id))?;
    let workflow = Workflow::try_from(row)?;

    if !workflow.is_active {
        return Err(EngineError::WorkflowInactive(id));
    }
    if workflow.trigger_kind != TriggerKind::Webhook {
        return Err(EngineError::WrongTrigger {
            id,
            expected: TriggerKind::Webhook.as_str(),
        });
    }

    let queued = match queue.submit(executor.job(workflow)).await {
        Ok(()) => true,
        Err(QueueError::QueueFull(job)) => {
            warn!(%job, "webhook job dropped; pool saturated");
            false
        }
        Err(e) => return Err(e.into()),
    };

    info!(queued, "webhook accepted");
    Ok(WebhookAck {
        workflow_id: id,
        queued,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::WorkflowRow;
    use db::MemoryStore;
    use nodes::mock::MockConnector;
    use nodes::ConnectorRegistry;
    use queue::InlineQueue;
    use serde_json::json;

    use crate::circuit_breaker::CircuitBreakerRegistry;
    use crate::ExecutorConfig;

    fn setup() -> (Arc<MemoryStore>, Arc<Executor>, Arc<MockConnector>) {
        let store = Arc::new(MemoryStore::new());
        let connector = Arc::new(MockConnector::succeeding("hooked"));
        let mut registry = ConnectorRegistry::new();
        registry.register("mock", connector.clone());
        let executor = Arc::new(Executor::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(CircuitBreakerRegistry::default()),
            ExecutorConfig::default(),
        ));
        (store, executor, connector)
    }

    fn webhook_workflow(store: &MemoryStore) -> Workflow {
        let wf = Workflow::new("hook", TriggerKind::Webhook, "mock", json!({}));
        store.insert_workflow(WorkflowRow::from(wf.clone()));
        wf
    }

    #[tokio::test]
    async fn active_webhook_workflow_is_queued_and_run() {
        let (store, executor, connector) = setup();
        let queue = InlineQueue::new();
        let wf = webhook_workflow(&store);

        let ack = dispatch_webhook(store.as_ref(), &executor, &queue, wf.id)
            .await
            .unwrap();

        assert!(ack.queued);
        assert_eq!(connector.call_count(), 1);
        assert_eq!(store.logs_for(wf.id)[0].status, "success");
    }

    #[tokio::test]
    async fn unknown_inactive_and_scheduled_workflows_are_refused() {
        let (store, executor, connector) = setup();
        let queue = InlineQueue::new();

        let missing = Uuid::new_v4();
        assert!(matches!(
            dispatch_webhook(store.as_ref(), &executor, &queue, missing).await,
            Err(EngineError::WorkflowNotFound(id)) if id == missing
        ));

        let wf = webhook_workflow(&store);
        let mut row = store.workflow(wf.id).unwrap();
        row.is_active = false;
        store.insert_workflow(row);
        assert!(matches!(
            dispatch_webhook(store.as_ref(), &executor, &queue, wf.id).await,
            Err(EngineError::WorkflowInactive(_))
        ));

        let scheduled = Workflow::new("poll", TriggerKind::Schedule, "mock", json!({}));
        store.insert_workflow(WorkflowRow::from(scheduled.clone()));
        assert!(matches!(
            dispatch_webhook(store.as_ref(), &executor, &queue, scheduled.id).await,
            Err(EngineError::WrongTrigger { .. })
        ));

        assert_eq!(connector.call_count(), 0);
        assert_eq!(queue.submitted(), 0);
    }

    #[tokio::test]
    async fn saturated_queue_still_acknowledges() {
        let (store, executor, connector) = setup();
        let queue = InlineQueue::rejecting();
        let wf = webhook_workflow(&store);

        let ack = dispatch_webhook(store.as_ref(), &executor, &queue, wf.id)
            .await
            .unwrap();

        assert!(!ack.queued);
        assert_eq!(connector.call_count(), 0);
        assert!(store.logs_for(wf.id).is_empty());
    }
}
