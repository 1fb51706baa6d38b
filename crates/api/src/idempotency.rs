//! Response replay for retried mutating requests.
//!
//! A client sends `Idempotency-Key` on a POST/PUT/PATCH/DELETE. The first
//! response for that key is captured (status, headers, body) and served again
//! for every repeat within the TTL, tagged with `Idempotent-Replayed: true`.
//! Two concurrent first requests with the same key may both execute; only
//! one response ends up cached. Responses over [`MAX_CACHED_BODY`] bytes, or
//! of unknown length, pass through without being cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes, HttpBody};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tenant::TENANT_ID_HEADER;
use crate::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

/// Largest response body the cache will hold.
pub const MAX_CACHED_BODY: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyConfig {
    /// How long a captured response is replayed.
    pub ttl: Duration,
    /// Period of the background purge.
    pub sweep_interval: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// A captured response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub cached_at: Instant,
}

impl CachedResponse {
    fn into_replay(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response.headers_mut().insert(
            HeaderName::from_static(REPLAYED_HEADER),
            HeaderValue::from_static("true"),
        );
        response
    }
}

pub struct IdempotencyCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedResponse>>,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The cached response for `key`, unless absent or older than the TTL.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .cloned()
    }

    /// Cache a response under `key`, stamped now.
    pub fn set(&self, key: impl Into<String>, status: StatusCode, headers: HeaderMap, body: Bytes) {
        let entry = CachedResponse {
            status,
            headers,
            body,
            cached_at: Instant::now(),
        };
        self.entries.write().insert(key.into(), entry);
    }

    /// Drop every entry older than the TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deterministic key for a request: SHA-256 over method, path and body.
    pub fn fingerprint_of(method: &Method, path: &str, body: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
        hasher.update(body);
        hex::encode(hasher.finalize())
    }

    /// Purge expired entries every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing can be stale yet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            info!(purged, "expired idempotency entries purged");
                        }
                    }
                }
            }
            debug!("idempotency sweeper stopped");
        })
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(IdempotencyConfig::default().ttl)
    }
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// The cache key for a request, if it carries a non-empty `Idempotency-Key`.
/// Keys are scoped to the tenant when one is present.
fn cache_key(headers: &HeaderMap) -> Option<String> {
    let client_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())?;
    Some(
        match headers.get(TENANT_ID_HEADER).and_then(|v| v.to_str().ok()) {
            Some(tenant) => format!("{tenant}:{client_key}"),
            None => client_key.to_owned(),
        },
    )
}

/// Whether `body` is known to fit under [`MAX_CACHED_BODY`] before reading it.
fn fits_cache(body: &Body) -> bool {
    body.size_hint()
        .upper()
        .is_some_and(|len| len <= MAX_CACHED_BODY as u64)
}

/// Replays cached responses for repeated `Idempotency-Key`s.
///
/// Server errors are not cached so a retry can succeed once the fault clears.
pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !is_mutating(request.method()) {
        return next.run(request).await;
    }
    let Some(key) = cache_key(request.headers()) else {
        return next.run(request).await;
    };

    if let Some(cached) = state.idempotency.get(&key) {
        debug!(%key, "replaying cached response");
        return cached.into_replay();
    }

    let response = next.run(request).await;
    if !fits_cache(response.body()) {
        debug!(%key, "response too large to cache, passing through");
        return response;
    }
    let (parts, body) = response.into_parts();
    let body = match to_bytes(body, MAX_CACHED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%key, error = %e, "could not buffer response for idempotency cache");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !parts.status.is_server_error() {
        state
            .idempotency
            .set(key, parts.status, parts.headers.clone(), body.clone());
    }
    Response::from_parts(parts, Body::from(body))
}
