//! Workflow reads and execution bookkeeping.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

const WORKFLOW_COLUMNS: &str = "id, owner_id, name, trigger_kind, action_kind, config, \
                                is_active, last_executed_at, created_at";

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<Option<WorkflowRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Return all active, schedule-triggered workflows (oldest first).
pub async fn list_active_scheduled(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows \
         WHERE trigger_kind = 'schedule' AND is_active = TRUE \
         ORDER BY created_at ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Stamp the start of an execution attempt.
pub async fn set_last_executed(
    pool: &PgPool,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE workflows SET last_executed_at = $1 WHERE id = $2")
        .bind(at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Enable or disable a workflow.
///
/// Returns `DbError::NotFound` if no row was updated.
pub async fn set_active(pool: &PgPool, id: Uuid, is_active: bool) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE workflows SET is_active = $1 WHERE id = $2")
        .bind(is_active)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
