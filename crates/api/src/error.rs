//! HTTP-facing error type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Database(#[from] db::DbError),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The endpoint needs an `X-Tenant-ID` header.
    #[error("missing tenant identity")]
    MissingTenant,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Engine(e) => match e {
                EngineError::WorkflowNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::WorkflowInactive(_) | EngineError::WrongTrigger { .. } => {
                    StatusCode::CONFLICT
                }
                EngineError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::InvalidWorkflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::Database(db::DbError::NotFound) => StatusCode::NOT_FOUND,
                EngineError::Database(_) | EngineError::Queue(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Database(db::DbError::NotFound) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MissingTenant => StatusCode::UNAUTHORIZED,
        }
    }
}

/// `{"error": message}` with the given status.
pub(crate) fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(error = %self, "request failed");
        }
        json_error(status, self.to_string())
    }
}
