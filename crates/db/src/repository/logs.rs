//! Execution log rows.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::LogRow, DbError};

/// Insert one execution outcome.
pub async fn insert_log(
    pool: &PgPool,
    workflow_id: Uuid,
    status: &str,
    message: &str,
) -> Result<LogRow, DbError> {
    let row = sqlx::query_as::<_, LogRow>(
        r#"
        INSERT INTO execution_logs (id, workflow_id, status, message, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, workflow_id, status, message, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(workflow_id)
    .bind(status)
    .bind(message)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}
