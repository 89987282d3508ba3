//! Rate-limited worker pool: bounded queue, one worker task, token-bucket
//! limiter, per-job timeout, transient-error requeue, drain on shutdown.
//!
//! [`channel`] builds the queue halves; [`spawn_pool_worker`] starts the
//! single consumer. Producers hold a [`PoolHandle`] whose
//! [`enqueue`](PoolHandle::enqueue) never blocks: when the queue is full the
//! send is handed to a detached task, bounded by a per-pool cap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pool::limiter::Limiter;
use crate::pool::{JobError, PoolJob};
use crate::{AppError, Result};

/// Upper bound on in-flight detached enqueuers per pool.
const MAX_DETACHED_ENQUEUES: usize = 256;

/// Static parameters for one worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pool name used in log fields.
    pub name: &'static str,
    /// Limiter refill rate in requests per second.
    pub rate_per_sec: f64,
    /// Limiter burst capacity.
    pub burst: u32,
    /// Bounded queue capacity.
    pub queue_capacity: usize,
    /// Per-job execution timeout.
    pub job_timeout: Duration,
    /// Delay before requeueing a rate-limited job.
    pub rate_limit_backoff: Duration,
    /// Delay before requeueing a timed-out job.
    pub timeout_requeue_delay: Duration,
    /// Per-job budget while draining after cancellation.
    pub drain_timeout: Duration,
}

impl PoolConfig {
    /// Baseline configuration: burst 1, 30s job timeout, 5s timeout-requeue
    /// delay, 5s drain budget.
    #[must_use]
    pub fn new(name: &'static str, rate_per_sec: f64, queue_capacity: usize) -> Self {
        Self {
            name,
            rate_per_sec,
            burst: 1,
            queue_capacity,
            job_timeout: Duration::from_secs(30),
            rate_limit_backoff: Duration::from_secs(1),
            timeout_requeue_delay: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(5),
        }
    }

    /// Override the rate-limit requeue backoff.
    #[must_use]
    pub fn rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    /// Override the per-job execution timeout.
    #[must_use]
    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// Producer half of a worker pool.
pub struct PoolHandle<J> {
    name: &'static str,
    tx: mpsc::Sender<J>,
    detached: Arc<Semaphore>,
}

impl<J> Clone for PoolHandle<J> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            detached: Arc::clone(&self.detached),
        }
    }
}

/// Consumer half of a worker pool, owned by exactly one worker task.
pub struct PoolQueue<J> {
    config: PoolConfig,
    rx: mpsc::Receiver<J>,
}

/// Build the two halves of a worker pool.
#[must_use]
pub fn channel<J: PoolJob>(config: PoolConfig) -> (PoolHandle<J>, PoolQueue<J>) {
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    (
        PoolHandle {
            name: config.name,
            tx,
            detached: Arc::new(Semaphore::new(MAX_DETACHED_ENQUEUES)),
        },
        PoolQueue { config, rx },
    )
}

impl<J: PoolJob> PoolHandle<J> {
    /// Submit a job without blocking.
    ///
    /// Fast path: the queue has room and the job is appended in FIFO order.
    /// Full queue: the send is handed to a detached task that waits for
    /// space; such jobs may land out of order relative to later fast-path
    /// enqueues.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Enqueue` when the detached-enqueuer cap is
    /// exhausted or the pool has shut down.
    pub fn enqueue(&self, job: J) -> Result<()> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(AppError::Enqueue(format!(
                "{} pool queue is closed",
                self.name
            ))),
            Err(TrySendError::Full(job)) => {
                let Ok(permit) = Arc::clone(&self.detached).try_acquire_owned() else {
                    warn!(pool = self.name, "detached enqueuer cap exhausted");
                    return Err(AppError::Enqueue(format!(
                        "{} pool is saturated; submission rejected",
                        self.name
                    )));
                };
                debug!(pool = self.name, "queue full; handing job to detached enqueuer");
                let tx = self.tx.clone();
                let name = self.name;
                tokio::spawn(async move {
                    let _permit = permit;
                    if tx.send(job).await.is_err() {
                        warn!(pool = name, "pool closed before detached enqueue completed");
                    }
                });
                Ok(())
            }
        }
    }
}

impl<J: PoolJob> PoolQueue<J> {
    /// Receive the next queued job; `None` once all handles are dropped.
    pub async fn recv(&mut self) -> Option<J> {
        self.rx.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<J> {
        self.rx.try_recv().ok()
    }

    /// Pool parameters this queue was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

/// Spawn the single worker task for a pool.
///
/// The worker serializes the pool's outbound HTTP stream under the limiter,
/// applies the per-job timeout, requeues transient failures, and drops
/// permanent ones. On cancellation it drains the remaining queue with a
/// short per-job budget before exiting.
#[must_use]
pub fn spawn_pool_worker<J: PoolJob>(
    queue: PoolQueue<J>,
    handle: PoolHandle<J>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_worker(queue, handle, cancel))
}

async fn run_worker<J: PoolJob>(
    mut queue: PoolQueue<J>,
    handle: PoolHandle<J>,
    cancel: CancellationToken,
) {
    let config = queue.config().clone();
    let limiter = Limiter::new(config.rate_per_sec, config.burst);
    info!(pool = config.name, rate = config.rate_per_sec, "pool worker started");

    loop {
        // Biased so that once cancellation fires, the worker moves to the
        // drain path instead of racing it against further queue reads.
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                drain(&mut queue, &config).await;
                break;
            }
            maybe_job = queue.recv() => {
                let Some(job) = maybe_job else {
                    info!(pool = config.name, "pool queue closed; worker exiting");
                    break;
                };
                process(job, &limiter, &handle, &config, &cancel).await;
            }
        }
    }

    info!(pool = config.name, "pool worker exited");
}

async fn process<J: PoolJob>(
    job: J,
    limiter: &Limiter,
    handle: &PoolHandle<J>,
    config: &PoolConfig,
    cancel: &CancellationToken,
) {
    // Token acquisition is bounded by the same per-job timeout as execution.
    match tokio::time::timeout(config.job_timeout, limiter.acquire(cancel)).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(pool = config.name, kind = job.kind(), "cancelled while rate limited; job dropped");
            return;
        }
        Err(_) => {
            warn!(pool = config.name, kind = job.kind(), "rate limiter wait exceeded job timeout");
            requeue(job, handle, config, cancel, config.timeout_requeue_delay).await;
            return;
        }
    }

    let outcome = tokio::time::timeout(config.job_timeout, job.execute(cancel.child_token())).await;
    match outcome {
        Ok(Ok(())) => {
            debug!(pool = config.name, kind = job.kind(), "job completed");
        }
        Ok(Err(JobError::RateLimited)) => {
            info!(
                pool = config.name,
                kind = job.kind(),
                backoff_ms = config.rate_limit_backoff.as_millis() as u64,
                "provider rate limit hit; requeueing"
            );
            requeue(job, handle, config, cancel, config.rate_limit_backoff).await;
        }
        Ok(Err(JobError::Timeout)) | Err(_) => {
            info!(pool = config.name, kind = job.kind(), "job timed out; requeueing");
            requeue(job, handle, config, cancel, config.timeout_requeue_delay).await;
        }
        Ok(Err(JobError::Permanent(reason))) => {
            warn!(pool = config.name, kind = job.kind(), %reason, "job failed permanently; dropped");
        }
    }
}

/// Sleep out the retry delay (observing cancellation) then put the job back.
async fn requeue<J: PoolJob>(
    job: J,
    handle: &PoolHandle<J>,
    config: &PoolConfig,
    cancel: &CancellationToken,
    delay: Duration,
) {
    tokio::select! {
        () = cancel.cancelled() => {
            warn!(pool = config.name, kind = job.kind(), "cancelled while waiting to requeue; job dropped");
            return;
        }
        () = tokio::time::sleep(delay) => {}
    }
    if let Err(err) = handle.enqueue(job) {
        warn!(pool = config.name, %err, "requeue failed; job dropped");
    }
}

/// Best-effort processing of whatever is left in the queue after
/// cancellation. Each job gets a fresh token and the drain budget; jobs
/// that exceed it are abandoned.
async fn drain<J: PoolJob>(queue: &mut PoolQueue<J>, config: &PoolConfig) {
    let mut drained = 0usize;
    while let Some(job) = queue.try_recv() {
        drained += 1;
        let scope = CancellationToken::new();
        if tokio::time::timeout(config.drain_timeout, job.execute(scope.clone()))
            .await
            .is_err()
        {
            scope.cancel();
            warn!(pool = config.name, kind = job.kind(), "drain budget exceeded; job abandoned");
        }
    }
    info!(pool = config.name, drained, "pool drained after cancellation");
}
