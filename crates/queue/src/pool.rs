//! Fixed-size worker pool over a bounded queue.
//!
//! `workers` long-lived tasks pull from one channel of capacity
//! `queue_capacity`. A full queue makes `submit` wait up to `submit_grace`
//! before the job is dropped. Every job runs in its own task under
//! `job_timeout`, with a cancellation token that is independent of the pool's
//! own lifecycle. A job that overruns its deadline has its token cancelled,
//! and its worker waits for it to return before taking the next job.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Job, JobQueue, QueueError};

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Maximum number of queued (not yet running) jobs.
    pub queue_capacity: usize,
    /// How long `submit` waits for room in a full queue.
    pub submit_grace: Duration,
    /// Deadline for a single job.
    pub job_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::with_workers(10)
    }
}

impl WorkerPoolConfig {
    /// `workers` workers with a queue ten times that size.
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            queue_capacity: workers * 10,
            submit_grace: Duration::from_secs(5),
            job_timeout: Duration::from_secs(5 * 60),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_submit_grace(mut self, grace: Duration) -> Self {
        self.submit_grace = grace;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub queued: usize,
    pub in_flight: usize,
}

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    started: AtomicBool,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            sender: RwLock::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), QueueError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(QueueError::AlreadyStarted);
        }

        info!(
            workers = self.config.workers,
            queue_capacity = self.config.queue_capacity,
            "starting worker pool"
        );

        let mut handles = self.workers.lock();
        for worker_id in 0..self.config.workers {
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&self.receiver),
                self.shutdown.clone(),
                Arc::clone(&self.counters),
                self.config.job_timeout,
            )));
        }
        Ok(())
    }

    /// Stop accepting jobs, tell the workers to stop, and wait up to
    /// `deadline` for in-flight jobs to finish.
    ///
    /// Jobs still queued when the workers stop are discarded. On timeout the
    /// remaining jobs are left running detached; nothing is aborted.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), QueueError> {
        self.sender.write().take();
        self.shutdown.cancel();

        let handles = std::mem::take(&mut *self.workers.lock());
        info!(
            in_flight = self.counters.in_flight.load(Ordering::SeqCst),
            ?deadline,
            "worker pool draining"
        );

        if tokio::time::timeout(deadline, futures::future::join_all(handles))
            .await
            .is_err()
        {
            let remaining = self.counters.in_flight.load(Ordering::SeqCst);
            warn!(remaining, "worker pool shutdown deadline exceeded");
            return Err(QueueError::ShutdownTimeout(remaining));
        }

        let mut rx = self.receiver.lock().await;
        rx.close();
        let mut discarded = 0usize;
        while let Ok(job) = rx.try_recv() {
            debug!(job = job.name(), "discarding queued job");
            discarded += 1;
        }
        self.counters.queued.store(0, Ordering::SeqCst);
        if discarded > 0 {
            warn!(discarded, "queued jobs discarded at shutdown");
        }

        info!("worker pool stopped");
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.config.workers,
            queued: self.counters.queued.load(Ordering::SeqCst),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl JobQueue for WorkerPool {
    async fn submit(&self, job: Job) -> Result<(), QueueError> {
        let sender = self.sender.read().clone().ok_or(QueueError::Closed)?;
        let name = job.name().to_owned();

        // Count before sending so a fast worker never decrements below zero.
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        match sender.send_timeout(job, self.config.submit_grace).await {
            Ok(()) => {
                debug!(job = %name, "job queued");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.counters.queued.fetch_sub(1, Ordering::SeqCst);
                warn!(
                    job = %name,
                    grace = ?self.config.submit_grace,
                    "job queue full, dropping job"
                );
                Err(QueueError::QueueFull(name))
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.counters.queued.fetch_sub(1, Ordering::SeqCst);
                Err(QueueError::Closed)
            }
        }
    }
}

async fn next_job(receiver: &tokio::sync::Mutex<mpsc::Receiver<Job>>) -> Option<Job> {
    receiver.lock().await.recv().await
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
    job_timeout: Duration,
) {
    debug!(worker_id, "worker started");
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = next_job(&receiver) => match job {
                Some(job) => job,
                None => break,
            },
        };
        counters.queued.fetch_sub(1, Ordering::SeqCst);
        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        run_job(worker_id, job, job_timeout).await;
        counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
    debug!(worker_id, "worker stopped");
}

async fn run_job(worker_id: usize, job: Job, job_timeout: Duration) {
    let name = job.name().to_owned();
    let cancel = CancellationToken::new();
    let mut handle = tokio::spawn(job.into_future(cancel.clone()));

    match tokio::time::timeout(job_timeout, &mut handle).await {
        Ok(Ok(())) => debug!(worker_id, job = %name, "job finished"),
        Ok(Err(join_err)) => error!(worker_id, job = %name, error = %join_err, "job aborted"),
        Err(_) => {
            cancel.cancel();
            warn!(worker_id, job = %name, ?job_timeout, "job exceeded its deadline");
            // The slot stays occupied until the task actually returns.
            if let Err(join_err) = handle.await {
                error!(worker_id, job = %name, error = %join_err, "job aborted");
            }
            debug!(worker_id, job = %name, "overdue job wound down");
        }
    }
}
