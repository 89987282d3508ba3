//! Rate-limited outbound worker pools.
//!
//! One pool per third-party API surface isolates blast radius: a stalled
//! SMS provider cannot starve conference registrations. Pool jobs are
//! tagged variants implementing [`PoolJob`]; the worker pattern-matches on
//! the classification of each failure to decide requeue versus drop.

pub mod limiter;
pub mod worker;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

pub use limiter::Limiter;
pub use worker::{channel, spawn_pool_worker, PoolConfig, PoolHandle, PoolQueue};

/// Failure taxonomy for pool job execution.
///
/// `RateLimited` and `Timeout` are transient and requeued; `Permanent`
/// failures are logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Provider signalled a per-second overflow (HTTP 429).
    RateLimited,
    /// Execution deadline exceeded.
    Timeout,
    /// Failure that will not succeed on retry.
    Permanent(String),
}

impl JobError {
    /// Whether the pool should requeue the job.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }

    /// Classify an HTTP transport failure: connect and timeout errors are
    /// retryable, everything else will not improve on retry.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Timeout
        } else {
            Self::Permanent(format!("transport failure: {err}"))
        }
    }
}

impl Display for JobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limit exceeded"),
            Self::Timeout => write!(f, "deadline exceeded"),
            Self::Permanent(reason) => write!(f, "permanent failure: {reason}"),
        }
    }
}

impl std::error::Error for JobError {}

/// A unit of work executed by a worker pool.
///
/// Implementations own their result channels; `execute` borrows the job so
/// the worker can requeue it after a transient failure.
pub trait PoolJob: Send + Sync + 'static {
    /// Run the job to completion or failure, observing cancellation.
    fn execute(
        &self,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), JobError>> + Send + '_>>;

    /// Short variant name for log fields.
    fn kind(&self) -> &'static str;
}
