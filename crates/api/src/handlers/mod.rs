pub mod webhooks;
pub mod workflows;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use engine::CircuitState;

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let open_circuits: Vec<String> = state
        .executor
        .breakers()
        .snapshot()
        .into_iter()
        .filter(|(_, s)| *s != CircuitState::Closed)
        .map(|(key, _)| key)
        .collect();

    Json(json!({
        "status": "ok",
        "open_circuits": open_circuits,
        "idempotency_entries": state.idempotency.len(),
        "rate_limited_tenants": state.rate_limiter.tenants(),
    }))
}
