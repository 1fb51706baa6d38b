//! Per-dependency circuit breakers.
//!
//! ```text
//! ┌─────────┐  max_failures  ┌────────┐  open_timeout (lazy)  ┌──────────┐
//! │ Closed  │ ─────────────► │  Open  │ ────────────────────► │ HalfOpen │
//! └─────────┘                └────────┘ ◄──── any failure ─── └──────────┘
//!      ▲                                                            │
//!      └──────────────────── half_open_max successes ───────────────┘
//! ```
//!
//! The Open → HalfOpen transition is evaluated when a call arrives; there is
//! no background timer. Breakers are looked up by key from a
//! [`CircuitBreakerRegistry`] and live for the rest of the process.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; every call is attempted.
    Closed,
    /// Calls are rejected without being attempted.
    Open,
    /// Probing for recovery; calls are attempted and a single failure reopens.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures (without an intervening success) that open a closed circuit.
    pub max_failures: u32,
    /// Time after the last failure before an open circuit lets a trial call through.
    pub open_timeout: Duration,
    /// Consecutive half-open successes that close the circuit again.
    pub half_open_max: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            open_timeout: Duration::from_secs(60),
            half_open_max: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_max_failures(mut self, max: u32) -> Self {
        self.max_failures = max.max(1);
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn with_half_open_max(mut self, max: u32) -> Self {
        self.half_open_max = max.max(1);
        self
    }
}

/// Outcome of a call made through a breaker.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was not attempted.
    #[error("circuit '{key}' is open")]
    Open { key: String },

    /// The operation ran and returned this error.
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    half_open_successes: u32,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            half_open_successes: 0,
        }
    }
}

/// A circuit breaker guarding one dependency key.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            state: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state, without applying the lazy Open → HalfOpen transition.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Run `op` under the breaker, counting every error as a failure.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_counting(op, |_| true).await
    }

    /// Run `op` under the breaker. Errors for which `counts` returns false
    /// are passed through without touching the breaker's counters.
    pub async fn call_counting<T, E, F, Fut, P>(
        &self,
        op: F,
        counts: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        self.admit()?;

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if counts(&err) {
                    self.record_failure();
                }
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Force the breaker closed with zeroed counters.
    pub fn reset(&self) {
        *self.state.lock() = BreakerState::closed();
        info!(breaker = %self.key, "circuit breaker manually reset");
    }

    fn admit<E>(&self) -> Result<(), BreakerError<E>> {
        let mut s = self.state.lock();
        if s.state != CircuitState::Open {
            return Ok(());
        }

        let cooled_down = s
            .last_failure_at
            .map_or(true, |at| at.elapsed() >= self.config.open_timeout);
        if cooled_down {
            s.state = CircuitState::HalfOpen;
            s.half_open_successes = 0;
            info!(breaker = %self.key, "circuit half-open, probing dependency");
            return Ok(());
        }

        debug!(breaker = %self.key, "circuit open, rejecting call");
        Err(BreakerError::Open {
            key: self.key.clone(),
        })
    }

    fn record_success(&self) {
        let mut s = self.state.lock();
        match s.state {
            CircuitState::Closed => s.failure_count = 0,
            CircuitState::HalfOpen => {
                s.half_open_successes += 1;
                if s.half_open_successes >= self.config.half_open_max {
                    *s = BreakerState::closed();
                    info!(breaker = %self.key, "circuit closed");
                }
            }
            // A call admitted before the circuit opened; it says nothing new.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut s = self.state.lock();
        s.last_failure_at = Some(Instant::now());
        match s.state {
            CircuitState::Closed => {
                s.failure_count += 1;
                if s.failure_count >= self.config.max_failures {
                    s.state = CircuitState::Open;
                    warn!(
                        breaker = %self.key,
                        failures = s.failure_count,
                        "circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                s.state = CircuitState::Open;
                s.half_open_successes = 0;
                warn!(breaker = %self.key, "trial call failed, circuit re-opened");
            }
            CircuitState::Open => s.failure_count += 1,
        }
    }
}

/// Lazily-populated map from dependency key to breaker.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// The breaker for `key`, created on first use.
    pub fn get(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(key) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        // Another caller may have created it between the two locks.
        Arc::clone(
            breakers
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(key, self.config.clone()))),
        )
    }

    /// Reset one breaker. Returns false if no breaker exists for `key`.
    pub fn reset(&self, key: &str) -> bool {
        match self.breakers.read().get(key) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// `(key, state)` for every known breaker, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let mut states: Vec<_> = self
            .breakers
            .read()
            .iter()
            .map(|(k, b)| (k.clone(), b.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}
