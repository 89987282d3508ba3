//! Single-bucket token rate limiter.
//!
//! Tokens refill continuously at `rate_per_sec` up to `burst`. Acquisition
//! is asynchronous: when the bucket is empty the caller sleeps until the
//! next token accrues, observing cancellation. Built on the tokio clock so
//! paused-time tests advance it deterministically.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate controller bound to one worker pool.
#[derive(Debug)]
pub struct Limiter {
    rate_per_sec: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl Limiter {
    /// Create a limiter that refills `rate_per_sec` tokens per second with
    /// the given burst capacity. The bucket starts full.
    ///
    /// # Panics
    ///
    /// Panics if `rate_per_sec` is not positive or `burst` is zero.
    #[must_use]
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        assert!(rate_per_sec > 0.0, "rate must be greater than zero");
        assert!(burst > 0, "burst must be greater than zero");
        Self {
            rate_per_sec,
            burst: f64::from(burst),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available; otherwise report how long until the
    /// next token accrues.
    ///
    /// # Errors
    ///
    /// Returns the wait duration when the bucket is empty.
    pub fn try_acquire(&self) -> std::result::Result<(), Duration> {
        let mut state = self.state.lock().expect("limiter state poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(deficit / self.rate_per_sec))
        }
    }

    /// Wait for one token. Returns `false` if cancellation fired first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        loop {
            match self.try_acquire() {
                Ok(()) => return true,
                Err(wait) => {
                    tokio::select! {
                        () = cancel.cancelled() => return false,
                        () = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    /// Configured refill rate in tokens per second.
    #[must_use]
    pub fn rate_per_sec(&self) -> f64 {
        self.rate_per_sec
    }
}
