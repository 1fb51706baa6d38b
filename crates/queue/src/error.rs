//! Queue-level error type.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue stayed full for the whole submit grace period; the job was dropped.
    #[error("job queue is full; job '{0}' dropped")]
    QueueFull(String),

    /// The pool is shutting down (or has shut down) and accepts no new jobs.
    #[error("job queue is closed")]
    Closed,

    #[error("worker pool is already running")]
    AlreadyStarted,

    /// In-flight jobs did not finish before the shutdown deadline.
    #[error("graceful shutdown timed out with {0} job(s) still running")]
    ShutdownTimeout(usize),
}
