//! Retry with exponential backoff
//!
//! Attempt `n` that fails with a retryable error waits
//! `base_delay * 2^(n-1)` before attempt `n + 1`, up to `max_attempts`.
//! Non-retryable errors return immediately.

use super::AnnotateError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Success value or the last error seen
    pub result: Result<T, AnnotateError>,
    /// Attempts actually made
    pub attempts: u32,
    /// Cancelled while waiting to retry
    pub cancelled: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `operation` until it succeeds, fails permanently, runs out of
    /// attempts or `cancel` fires during a backoff
    pub async fn run<F, Fut, T>(&self, chunk: usize, cancel: &CancellationToken, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AnnotateError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if attempt > 1 {
                tracing::debug!(chunk, attempt, "Retrying annotation call");
            }

            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(chunk, attempt, "Annotation call succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        cancelled: false,
                    };
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                tracing::warn!(chunk, attempt, error = %err, "Annotation call failed permanently, not retrying");
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                    cancelled: false,
                };
            }

            if attempt >= self.max_attempts {
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                    cancelled: false,
                };
            }

            let delay = self.delay_for(attempt);
            let backoff_ms = delay.as_millis() as u64;
            if err.is_rate_limit() {
                tracing::warn!(
                    chunk,
                    attempt,
                    backoff_ms,
                    rate_limited = true,
                    error = %err,
                    "Annotation service rate limit hit, backing off"
                );
            } else {
                tracing::warn!(chunk, attempt, backoff_ms, error = %err, "Annotation call failed, backing off");
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                        cancelled: true,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
