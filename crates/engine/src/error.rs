//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the execution engine.
///
/// None of these terminate the process: the executor folds most failures
/// into a `Failed` [`crate::ExecutionResult`], and the scheduler logs and
/// moves on.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A stored workflow row could not be turned into a domain workflow.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("workflow {0} is not active")]
    WorkflowInactive(Uuid),

    /// The workflow exists but is not started by this kind of trigger.
    #[error("workflow {id} is not {expected}-triggered")]
    WrongTrigger { id: Uuid, expected: &'static str },

    /// The dependency's circuit breaker is open; the action was not attempted.
    #[error("circuit '{key}' is open; action not attempted")]
    CircuitOpen { key: String },

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// The job could not be handed to the worker pool.
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
}
