//! Shared handler state.

use std::sync::Arc;

use db::Store;
use engine::Executor;
use queue::JobQueue;

use crate::idempotency::IdempotencyCache;
use crate::rate_limit::TenantRateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub executor: Arc<Executor>,
    pub queue: Arc<dyn JobQueue>,
    pub rate_limiter: Arc<TenantRateLimiter>,
    pub idempotency: Arc<IdempotencyCache>,
}
