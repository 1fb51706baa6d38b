//! `InlineQueue`: a synchronous [`JobQueue`] for tests.
//!
//! `submit` runs the job to completion before returning, so a test can
//! assert on side effects right after the call.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{Job, JobQueue, QueueError};

#[derive(Default)]
pub struct InlineQueue {
    submitted: AtomicUsize,
    names: Mutex<Vec<String>>,
    rejecting: AtomicBool,
}

impl InlineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that rejects every job as if it were full.
    pub fn rejecting() -> Self {
        let queue = Self::default();
        queue.rejecting.store(true, Ordering::SeqCst);
        queue
    }

    /// Number of jobs accepted so far.
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Names of accepted jobs, in submission order.
    pub fn job_names(&self) -> Vec<String> {
        self.names.lock().clone()
    }
}

#[async_trait]
impl JobQueue for InlineQueue {
    async fn submit(&self, job: Job) -> Result<(), QueueError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(QueueError::QueueFull(job.name().to_owned()));
        }
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.names.lock().push(job.name().to_owned());
        job.into_future(CancellationToken::new()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_job_before_returning() {
        let queue = InlineQueue::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        queue
            .submit(Job::new("inline", move |_| async move {
                flag.store(true, Ordering::SeqCst);
            }))
            .await
            .unwrap();

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(queue.job_names(), vec!["inline".to_string()]);
    }

    #[tokio::test]
    async fn rejecting_queue_reports_full() {
        let queue = InlineQueue::rejecting();
        let err = queue.submit(Job::new("x", |_| async {})).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueFull(_)));
        assert_eq!(queue.submitted(), 0);
    }
}
