//! In-memory implementation of [`Store`].
//!
//! Used by the test suites and by `serve --in-memory`. Provides the same
//! semantics as the Postgres store, minus durability.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::{LogRow, WorkflowRow};
use crate::{DbError, Store};

#[derive(Default)]
pub struct MemoryStore {
    workflows: RwLock<HashMap<Uuid, WorkflowRow>>,
    logs: RwLock<Vec<LogRow>>,
    credentials: RwLock<HashMap<(Uuid, String), String>>,
    failing_lookups: RwLock<HashSet<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_workflow(&self, row: WorkflowRow) {
        self.workflows.write().insert(row.id, row);
    }

    pub fn remove_workflow(&self, id: Uuid) -> Option<WorkflowRow> {
        self.workflows.write().remove(&id)
    }

    pub fn put_credential(&self, owner_id: Uuid, service: impl Into<String>, secret: impl Into<String>) {
        self.credentials
            .write()
            .insert((owner_id, service.into()), secret.into());
    }

    /// Make `get_workflow_by_id(id)` fail with `DbError::Unavailable`.
    pub fn fail_lookups_for(&self, id: Uuid) {
        self.failing_lookups.write().insert(id);
    }

    /// Snapshot of a workflow row.
    pub fn workflow(&self, id: Uuid) -> Option<WorkflowRow> {
        self.workflows.read().get(&id).cloned()
    }

    /// All log rows, oldest first.
    pub fn logs(&self) -> Vec<LogRow> {
        self.logs.read().clone()
    }

    pub fn logs_for(&self, workflow_id: Uuid) -> Vec<LogRow> {
        self.logs
            .read()
            .iter()
            .filter(|l| l.workflow_id == workflow_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_active_scheduled_workflows(&self) -> Result<Vec<WorkflowRow>, DbError> {
        let mut rows: Vec<WorkflowRow> = self
            .workflows
            .read()
            .values()
            .filter(|w| w.is_active && w.trigger_kind == "schedule")
            .cloned()
            .collect();
        rows.sort_by_key(|w| w.created_at);
        Ok(rows)
    }

    async fn get_workflow_by_id(&self, id: Uuid) -> Result<Option<WorkflowRow>, DbError> {
        if self.failing_lookups.read().contains(&id) {
            return Err(DbError::Unavailable(format!("lookup of {id} disabled")));
        }
        Ok(self.workflows.read().get(&id).cloned())
    }

    async fn update_workflow_last_executed(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut workflows = self.workflows.write();
        let row = workflows.get_mut(&id).ok_or(DbError::NotFound)?;
        row.last_executed_at = Some(at);
        Ok(())
    }

    async fn update_workflow_active(&self, id: Uuid, is_active: bool) -> Result<(), DbError> {
        let mut workflows = self.workflows.write();
        let row = workflows.get_mut(&id).ok_or(DbError::NotFound)?;
        row.is_active = is_active;
        Ok(())
    }

    async fn create_log(
        &self,
        workflow_id: Uuid,
        status: &str,
        message: &str,
    ) -> Result<LogRow, DbError> {
        let row = LogRow {
            id: Uuid::new_v4(),
            workflow_id,
            status: status.to_owned(),
            message: message.to_owned(),
            created_at: Utc::now(),
        };
        self.logs.write().push(row.clone());
        Ok(row)
    }

    async fn get_credential(
        &self,
        owner_id: Uuid,
        service: &str,
    ) -> Result<Option<String>, DbError> {
        Ok(self
            .credentials
            .read()
            .get(&(owner_id, service.to_owned()))
            .cloned())
    }
}
