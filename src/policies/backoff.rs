//! # Backoff policy for retried work.
//!
//! [`BackoffPolicy`] controls how retry delays grow after repeated failures.
//! The delay before retry `n` (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jitter is applied. The base is derived from the attempt number alone, so jitter
//! never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use taskcore::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//! // 100ms × 2^10 = 102.4s → capped at max
//! assert_eq!(backoff.next(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use rand::Rng;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter policy.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 100ms`, `factor = 2.0`, `max = 30s`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Exponential backoff starting at `first`, uncapped in practice (`max = u32::MAX` seconds).
    pub fn exponential(first: Duration, factor: f64) -> Self {
        Self {
            first,
            max: Duration::from_secs(u64::from(u32::MAX)),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Returns a copy with a different jitter policy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns a copy with a different cap.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Delay before retry `attempt` (0-indexed) without jitter.
    ///
    /// Anything the float math cannot express as a duration (overflow, a negative factor)
    /// lands on `max`.
    pub fn nominal(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.first.as_secs_f64() * self.factor.powi(exp))
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Sleep before retry `attempt`, with jitter drawn from the thread-local generator.
    pub fn next(&self, attempt: u32) -> Duration {
        self.next_with(attempt, &mut rand::rng())
    }

    /// Like [`next`](Self::next) with a caller-supplied generator.
    pub fn next_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let (floor, cap) = (self.first.min(self.max), self.max);
        self.jitter.sample(self.nominal(attempt), floor, cap, rng)
    }

    /// Longest sleep jitter may produce before retry `attempt`.
    pub fn upper_bound(&self, attempt: u32) -> Duration {
        let (floor, cap) = (self.first.min(self.max), self.max);
        self.jitter.window(self.nominal(attempt), floor, cap).1
    }
}
