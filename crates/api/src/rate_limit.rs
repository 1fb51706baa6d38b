//! Per-tenant token-bucket admission control.
//!
//! Each tenant gets its own `governor` bucket, created on first sight and
//! sized by the tier the request carries. A later request on a higher tier
//! replaces the bucket with one charged the lower tier's full burst, so an
//! upgrade never refills an exhausted tenant. Requests on a lower tier keep
//! drawing from the existing bucket.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use parking_lot::RwLock;
use tracing::debug;

use crate::tenant::{Tenant, Tier};
use crate::AppState;

type Bucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Steady-state rate and burst capacity for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierQuota {
    pub per_second: u32,
    pub burst: u32,
}

impl TierQuota {
    pub const fn new(per_second: u32, burst: u32) -> Self {
        Self { per_second, burst }
    }

    fn rate(&self) -> NonZeroU32 {
        NonZeroU32::new(self.per_second).unwrap_or(NonZeroU32::MIN)
    }

    fn burst_size(&self) -> NonZeroU32 {
        NonZeroU32::new(self.burst).unwrap_or_else(|| self.rate())
    }

    fn quota(&self) -> Quota {
        Quota::per_second(self.rate()).allow_burst(self.burst_size())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub free: TierQuota,
    pub paid: TierQuota,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            free: TierQuota::new(5, 10),
            paid: TierQuota::new(50, 100),
        }
    }
}

impl RateLimitConfig {
    fn for_tier(&self, tier: Tier) -> TierQuota {
        match tier {
            Tier::Free => self.free,
            Tier::Paid => self.paid,
        }
    }
}

pub struct TenantRateLimiter {
    config: RateLimitConfig,
    clock: DefaultClock,
    buckets: RwLock<HashMap<String, (Tier, Arc<Bucket>)>>,
}

impl TenantRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clock: DefaultClock::default(),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Take one token from `tenant`'s bucket.
    ///
    /// # Errors
    /// The suggested wait before retrying when the bucket is empty.
    pub fn allow(&self, tenant: &str, tier: Tier) -> Result<(), Duration> {
        let bucket = self.bucket(tenant, tier);
        bucket
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Number of tenants with a live bucket.
    pub fn tenants(&self) -> usize {
        self.buckets.read().len()
    }

    fn bucket(&self, tenant: &str, tier: Tier) -> Arc<Bucket> {
        if let Some((bucket_tier, bucket)) = self.buckets.read().get(tenant) {
            if tier <= *bucket_tier {
                return Arc::clone(bucket);
            }
        }

        let mut buckets = self.buckets.write();
        // Another request may have created or upgraded it meanwhile.
        let previous = match buckets.get(tenant) {
            Some((bucket_tier, bucket)) if tier <= *bucket_tier => return Arc::clone(bucket),
            Some((bucket_tier, _)) => Some(*bucket_tier),
            None => None,
        };

        let bucket = Arc::new(RateLimiter::direct(self.config.for_tier(tier).quota()));
        if let Some(previous) = previous {
            debug!(tenant, from = ?previous, to = ?tier, "tenant upgraded, rebuilding bucket");
            let spent = self.config.for_tier(previous).burst_size();
            // A fresh bucket can only refuse when `spent` exceeds its capacity.
            if bucket.check_n(spent).is_err() {
                debug!(tenant, "upgraded bucket smaller than previous burst, starting full");
            }
        }
        buckets.insert(tenant.to_owned(), (tier, Arc::clone(&bucket)));
        bucket
    }
}

impl Default for TenantRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

/// Rejects over-quota tenants with `429 Too Many Requests` and a
/// `Retry-After` header. Requests without a tenant pass straight through.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let tenant = match Tenant::from_headers(request.headers()) {
        Ok(Some(tenant)) => tenant,
        Ok(None) => return next.run(request).await,
        Err(e) => return e.into_response(),
    };

    match state.rate_limiter.allow(&tenant.id.to_string(), tenant.tier) {
        Ok(()) => next.run(request).await,
        Err(wait) => {
            let retry_after = retry_after_secs(wait);
            debug!(tenant = %tenant.id, retry_after, "rate limited");
            let body = serde_json::json!({
                "error": "rate limit exceeded",
                "retry_after": retry_after,
            });
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}

/// Whole seconds, rounded up, never zero.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}
