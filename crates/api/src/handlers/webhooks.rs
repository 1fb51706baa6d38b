use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use engine::{dispatch_webhook, WebhookAck};

use crate::{ApiError, AppState};

/// `POST /api/v1/webhook/:workflow_id`
///
/// Acknowledges with 202 once the execution is handed to the pool. The
/// request body is accepted but not forwarded to the action.
pub async fn handle_webhook(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<WebhookAck>), ApiError> {
    let ack = dispatch_webhook(
        state.store.as_ref(),
        &state.executor,
        state.queue.as_ref(),
        id,
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}
