//! `api` crate: the HTTP entry points and the gates in front of them.
//!
//! Exposes:
//!   POST  /api/v1/webhook/:workflow_id
//!   POST  /api/v1/workflows/dry-run
//!   PATCH /api/v1/workflows/:id/active
//!   GET   /health
//!
//! Every route sits behind the tenant rate limiter; mutating routes also
//! honour `Idempotency-Key`.

pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod rate_limit;
pub mod state;
pub mod tenant;

use std::future::Future;

use axum::routing::{get, patch, post};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use idempotency::{IdempotencyCache, IdempotencyConfig};
pub use rate_limit::{RateLimitConfig, TenantRateLimiter, TierQuota};
pub use state::AppState;
pub use tenant::{Tenant, Tier};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/webhook/:workflow_id",
            post(handlers::webhooks::handle_webhook),
        )
        .route(
            "/api/v1/workflows/dry-run",
            post(handlers::workflows::dry_run),
        )
        .route(
            "/api/v1/workflows/:id/active",
            patch(handlers::workflows::set_active),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            idempotency::idempotency_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "http server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
