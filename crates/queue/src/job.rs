//! The unit of work and the submission seam.

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::QueueError;

/// A named, boxed unit of asynchronous work.
///
/// The closure receives a token that is cancelled when the job's execution
/// deadline passes; jobs are expected to observe it.
pub struct Job {
    name: String,
    run: Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>,
}

impl Job {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move |token| Box::pin(f(token))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consume the job and produce its future.
    pub fn into_future(self, cancel: CancellationToken) -> BoxFuture<'static, ()> {
        (self.run)(cancel)
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish()
    }
}

/// Anything that accepts jobs for asynchronous execution.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Hand `job` off for execution. Returns once the job is accepted (or
    /// rejected); it does not wait for the job to run.
    async fn submit(&self, job: Job) -> Result<(), QueueError>;
}
