//! `engine` crate: domain models, the circuit breaker, the executor and the
//! schedule/webhook dispatch paths.

pub mod circuit_breaker;
pub mod error;
pub mod executor;
pub mod models;
pub mod scheduler;
pub mod webhook;

pub use circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
pub use error::EngineError;
pub use executor::{breaker_key, Executor, ExecutorConfig};
pub use models::{ExecutionResult, ExecutionStatus, TriggerKind, Workflow};
pub use scheduler::{Dispatch, Scheduler, SchedulerConfig, TickSummary};
pub use webhook::{dispatch_webhook, WebhookAck};

#[cfg(test)]
mod executor_tests;
