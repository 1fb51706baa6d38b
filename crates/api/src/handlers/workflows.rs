use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use engine::{ExecutionResult, TriggerKind, Workflow};

use crate::tenant::Tenant;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct DryRunDto {
    pub action_kind: String,
    #[serde(default)]
    pub config: Value,
}

/// `POST /api/v1/workflows/dry-run`
///
/// Runs the action once for the calling tenant without persisting anything.
pub async fn dry_run(
    State(state): State<AppState>,
    tenant: Tenant,
    Json(payload): Json<DryRunDto>,
) -> Result<Json<ExecutionResult>, ApiError> {
    if payload.action_kind.trim().is_empty() {
        return Err(ApiError::BadRequest("action_kind must not be empty".into()));
    }

    let mut workflow = Workflow::new(
        "dry-run",
        TriggerKind::Webhook,
        payload.action_kind,
        payload.config,
    );
    workflow.owner_id = tenant.id;

    let result = state
        .executor
        .dry_run(&workflow, tenant.id, &tenant.id.to_string())
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetActiveDto {
    pub is_active: bool,
}

/// `PATCH /api/v1/workflows/:id/active`
pub async fn set_active(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<SetActiveDto>,
) -> Result<Json<Value>, ApiError> {
    state.store.update_workflow_active(id, payload.is_active).await?;
    tracing::info!(workflow_id = %id, is_active = payload.is_active, "workflow toggled");
    Ok(Json(serde_json::json!({ "id": id, "is_active": payload.is_active })))
}
