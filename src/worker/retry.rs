//! # Retry with backoff.
//!
//! [`async_retry`] calls an async operation until it succeeds or the [`RetryPolicy`] is
//! exhausted. The delay before retry `n` comes from [`BackoffPolicy::next`], so with the default
//! policy the waits are `100ms, 200ms, 400ms`.
//!
//! ```text
//! attempt 1 ──Err──► sleep(next(0)) ──► attempt 2 ──Err──► sleep(next(1)) ──► ... ──► last Err
//!     └──Ok──► return value                  └──Ok──► return value
//! ```
//!
//! A non-retryable error ([`TaskError::is_retryable`] is `false`) ends the loop immediately.

use std::time::Duration;

use crate::config::Config;
use crate::error::TaskError;
use crate::policies::BackoffPolicy;

/// How many times to retry and how long to wait in between.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (`0` = single attempt).
    pub max_retries: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
}

impl RetryPolicy {
    /// Exponential schedule: `delay × factor^n` before retry `n`, uncapped.
    pub fn new(max_retries: u32, delay: Duration, factor: f64) -> Self {
        Self {
            max_retries,
            backoff: BackoffPolicy::exponential(delay, factor),
        }
    }

    /// Single attempt, no retries.
    pub fn never() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Returns a copy with a different backoff schedule.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Longest time [`async_retry`] can spend sleeping between attempts under this policy.
    pub fn max_total_delay(&self) -> Duration {
        (0..self.max_retries)
            .map(|n| self.backoff.upper_bound(n))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Total number of attempts this policy allows.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    /// 3 retries, 100ms doubling up to 30s.
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Runs `f` until it succeeds, the policy is exhausted, or it returns a non-retryable error.
///
/// `f` receives the 1-based attempt number. The last error is returned on exhaustion.
pub async fn async_retry<T, F, Fut>(mut f: F, policy: RetryPolicy) -> Result<T, TaskError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1u32;
    loop {
        match f(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => {
                tracing::debug!(attempt, label = err.as_label(), "non-retryable error, giving up");
                return Err(err);
            }
            Err(err) if attempt >= attempts => {
                tracing::warn!(attempt, error = %err, "retries exhausted");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.backoff.next(attempt - 1);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// [`async_retry`] with the policy from `config.retry`.
pub async fn async_retry_with_defaults<T, F, Fut>(f: F, config: &Config) -> Result<T, TaskError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    async_retry(f, config.retry).await
}
