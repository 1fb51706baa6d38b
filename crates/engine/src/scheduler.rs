//! Polling scheduler for schedule-triggered workflows.
//!
//! One background loop ticks every `tick_interval`. Each tick lists the
//! active scheduled workflows, re-reads every one of them right before
//! dispatch, and submits the due ones to the job queue. Ticks are
//! independent: there is no cursor and no memory of earlier ticks.
//!
//! A failure while handling one workflow is logged and the scan continues.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use db::Store;
use queue::JobQueue;

use crate::{EngineError, Executor, TriggerKind, Workflow};

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Time between scans.
    pub tick_interval: Duration,
    /// Interval used when a workflow's config has no positive `interval_minutes`.
    pub default_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            default_interval: Duration::from_secs(10 * 60),
        }
    }
}

impl SchedulerConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// What happened to one workflow during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Submitted,
    NotDue,
    Inactive,
    /// The workflow changed to a non-schedule trigger since the listing.
    NotScheduled,
    /// The workflow was deleted since the listing.
    NotFound,
}

/// Per-tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub scanned: usize,
    pub submitted: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    executor: Arc<Executor>,
    queue: Arc<dyn JobQueue>,
    config: SchedulerConfig,
    stop: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        executor: Arc<Executor>,
        queue: Arc<dyn JobQueue>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            executor,
            queue,
            config,
            stop: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the ticking loop. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() || self.stop.is_cancelled() {
            return;
        }

        let scheduler = Arc::clone(self);
        info!(tick = ?self.config.tick_interval, "starting scheduler");
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = scheduler.stop.cancelled() => break,
                    _ = ticker.tick() => {
                        scheduler.tick(Utc::now()).await;
                    }
                }
            }
            info!("scheduler stopped");
        }));
    }

    /// Stop ticking and wait for the loop to exit. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.stop.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler loop ended abnormally");
            }
        }
    }

    /// One scan-and-dispatch pass.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> TickSummary {
        let mut summary = TickSummary::default();

        let workflows = match self.store.get_active_scheduled_workflows().await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "could not list scheduled workflows");
                summary.errors += 1;
                return summary;
            }
        };

        for row in workflows {
            summary.scanned += 1;
            match self.check_and_execute(row.id, now).await {
                Ok(Dispatch::Submitted) => summary.submitted += 1,
                Ok(outcome) => {
                    debug!(workflow_id = %row.id, ?outcome, "workflow not dispatched");
                    summary.skipped += 1;
                }
                Err(e) => {
                    warn!(workflow_id = %row.id, error = %e, "scheduled workflow skipped");
                    summary.errors += 1;
                }
            }
        }

        if summary.scanned > 0 {
            info!(
                scanned = summary.scanned,
                submitted = summary.submitted,
                errors = summary.errors,
                "scheduler tick complete"
            );
        }
        summary
    }

    /// Re-read workflow `id` and submit it if it is still active and due.
    pub async fn check_and_execute(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Dispatch, EngineError> {
        let Some(row) = self.store.get_workflow_by_id(id).await? else {
            return Ok(Dispatch::NotFound);
        };
        let workflow = Workflow::try_from(row)?;

        if !workflow.is_active {
            return Ok(Dispatch::Inactive);
        }
        if workflow.trigger_kind != TriggerKind::Schedule {
            return Ok(Dispatch::NotScheduled);
        }
        if !workflow.is_due(now, self.config.default_interval) {
            return Ok(Dispatch::NotDue);
        }

        self.queue.submit(self.executor.job(workflow)).await?;
        Ok(Dispatch::Submitted)
    }
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

    struct Harness {
        store: Arc<MemoryStore>,
        queue: Arc<InlineQueue>,
        connector: Arc<MockConnector>,
        scheduler: Arc<Scheduler>,
    }

    fn harness_with(queue: InlineQueue) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let connector = Arc::new(MockConnector::succeeding("polled"));
        let mut registry = ConnectorRegistry::new();
        registry.register("mock", connector.clone());

        let executor = Arc::new(Executor::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(CircuitBreakerRegistry::default()),
            ExecutorConfig::default(),
        ));
        let queue = Arc::new(queue);
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            executor,
            queue.clone(),
            SchedulerConfig::default(),
        ));
        Harness {
            store,
            queue,
            connector,
            scheduler,
        }
    }

    fn harness() -> Harness {
        harness_with(InlineQueue::new())
    }

    fn scheduled(minutes_since_last_run: Option<i64>, now: DateTime<Utc>) -> Workflow {
        let mut wf = Workflow::new(
            "poll",
            TriggerKind::Schedule,
            "mock",
            json!({ "interval_minutes": 10 }),
        );
        wf.last_executed_at = minutes_since_last_run.map(|m| now - chrono::Duration::minutes(m));
        wf
    }

    fn insert(store: &MemoryStore, wf: &Workflow) {
        store.insert_workflow(WorkflowRow::from(wf.clone()));
    }

    #[tokio::test]
    async fn dispatches_only_when_interval_has_elapsed() {
        let h = harness();
        let now = Utc::now();
        let recent = scheduled(Some(9), now);
        let stale = scheduled(Some(10), now);
        let fresh = scheduled(None, now);
        for wf in [&recent, &stale, &fresh] {
            insert(&h.store, wf);
        }

        assert_eq!(
            h.scheduler.check_and_execute(recent.id, now).await.unwrap(),
            Dispatch::NotDue
        );
        assert_eq!(
            h.scheduler.check_and_execute(stale.id, now).await.unwrap(),
            Dispatch::Submitted
        );
        assert_eq!(
            h.scheduler.check_and_execute(fresh.id, now).await.unwrap(),
            Dispatch::Submitted
        );
        assert_eq!(h.queue.submitted(), 2);
        assert_eq!(h.connector.call_count(), 2);
    }

    #[tokio::test]
    async fn tick_runs_due_workflows_and_stamps_them() {
        let h = harness();
        let now = Utc::now();
        let due = scheduled(None, now);
        insert(&h.store, &due);

        let summary = h.scheduler.tick(now).await;
        assert_eq!(summary.submitted, 1);
        assert!(h.store.workflow(due.id).unwrap().last_executed_at.is_some());
        assert_eq!(h.store.logs_for(due.id).len(), 1);

        // Same instant again: it just ran, so it is no longer due.
        let again = h.scheduler.tick(Utc::now()).await;
        assert_eq!(again.submitted, 0);
        assert_eq!(again.skipped, 1);
    }

    #[tokio::test]
    async fn workflow_disabled_after_listing_is_skipped() {
        let h = harness();
        let now = Utc::now();
        let mut wf = scheduled(None, now);
        wf.is_active = false;
        insert(&h.store, &wf);

        assert_eq!(
            h.scheduler.check_and_execute(wf.id, now).await.unwrap(),
            Dispatch::Inactive
        );
        assert_eq!(
            h.scheduler.check_and_execute(Uuid::new_v4(), now).await.unwrap(),
            Dispatch::NotFound
        );
        assert_eq!(h.connector.call_count(), 0);
    }

    #[tokio::test]
    async fn workflow_deleted_after_listing_is_skipped() {
        let h = harness();
        let now = Utc::now();
        let wf = scheduled(None, now);
        insert(&h.store, &wf);

        let listed = h.store.get_active_scheduled_workflows().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(h.store.remove_workflow(wf.id).is_some());

        assert_eq!(
            h.scheduler.check_and_execute(listed[0].id, now).await.unwrap(),
            Dispatch::NotFound
        );
        assert_eq!(h.queue.submitted(), 0);
        assert_eq!(h.connector.call_count(), 0);
        assert!(h.store.logs_for(wf.id).is_empty());
    }

    #[tokio::test]
    async fn one_failing_workflow_does_not_abort_the_tick() {
        let h = harness();
        let now = Utc::now();
        let broken = scheduled(None, now);
        let healthy = scheduled(None, now);
        insert(&h.store, &broken);
        insert(&h.store, &healthy);
        h.store.fail_lookups_for(broken.id);

        let summary = h.scheduler.tick(now).await;
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.submitted, 1);
        assert_eq!(h.store.logs_for(healthy.id).len(), 1);
    }

    #[tokio::test]
    async fn dropped_job_leaves_workflow_due_for_next_tick() {
        let h = harness_with(InlineQueue::rejecting());
        let now = Utc::now();
        let wf = scheduled(None, now);
        insert(&h.store, &wf);

        let summary = h.scheduler.tick(now).await;
        assert_eq!(summary.errors, 1);
        assert!(h.store.workflow(wf.id).unwrap().last_executed_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ticks_until_stopped() {
        let h = harness();
        let wf = scheduled(None, Utc::now());
        insert(&h.store, &wf);

        h.scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.scheduler.stop().await;
        h.scheduler.stop().await;

        // The first tick fires immediately.
        assert_eq!(h.connector.call_count(), 1);
    }
}
