//! The `Store` trait: everything the execution engine needs from persistence.
//!
//! The engine only ever talks to `Arc<dyn Store>`; [`crate::PgStore`] is the
//! production implementation and [`crate::MemoryStore`] the in-process one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{LogRow, WorkflowRow};
use crate::DbError;

#[async_trait]
pub trait Store: Send + Sync {
    /// All workflows with `trigger_kind = 'schedule'` and `is_active = true`.
    async fn get_active_scheduled_workflows(&self) -> Result<Vec<WorkflowRow>, DbError>;

    /// A single workflow, or `None` if it does not exist.
    async fn get_workflow_by_id(&self, id: Uuid) -> Result<Option<WorkflowRow>, DbError>;

    async fn update_workflow_last_executed(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DbError>;

    /// Returns `DbError::NotFound` if no workflow has this id.
    async fn update_workflow_active(&self, id: Uuid, is_active: bool) -> Result<(), DbError>;

    async fn create_log(
        &self,
        workflow_id: Uuid,
        status: &str,
        message: &str,
    ) -> Result<LogRow, DbError>;

    /// The decrypted secret `owner_id` stored for `service`, if any.
    async fn get_credential(&self, owner_id: Uuid, service: &str)
        -> Result<Option<String>, DbError>;
}
