//! `queue` crate: bounded in-process job execution.
//!
//! [`WorkerPool`] runs a fixed number of workers over a capped queue;
//! [`InlineQueue`] runs each job synchronously inside `submit` and exists so
//! tests can swap the pool out behind the [`JobQueue`] trait.

pub mod error;
pub mod inline;
pub mod job;
pub mod pool;

pub use error::QueueError;
pub use inline::InlineQueue;
pub use job::{Job, JobQueue};
pub use pool::{PoolStats, WorkerPool, WorkerPoolConfig};
