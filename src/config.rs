//! # Runtime configuration.
//!
//! [`Config`] centralizes the knobs shared by the bus, the workers and the task builders.
//!
//! Config is used in three ways:
//! 1. **Bus creation**: `MessageBus::with_config(&config)`
//! 2. **Worker defaults**: `AsyncWorkerManager::with_config(&config)`, `async_retry(f, config.retry)`
//! 3. **Task defaults**: `SimpleTask::builder(name).with_defaults(&config)`
//!
//! ## Sentinel values
//! - `bus_dispatch_threads = 0` → one thread per available core
//! - `worker_timeout = 0s` → workers wait without a deadline
//! - `task_timeout = 0s` → tasks run without a deadline

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use crate::worker::RetryPolicy;

/// Global configuration for the orchestration core.
///
/// ## Field semantics
/// - `bus_dispatch_threads`: number of bus dispatch threads (`0` = available parallelism)
/// - `worker_timeout`: default deadline for `AsyncWorker::wait_for_completion` (`0s` = none)
/// - `task_timeout`: default per-run task deadline (`0s` = none)
/// - `retry`: default policy for [`async_retry`](crate::async_retry)
///
/// All fields are public. Prefer the helper accessors over checking sentinels inline.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of dispatch threads draining the message bus.
    ///
    /// Messages are routed to a thread by topic hash, so per-topic order holds regardless of
    /// the count.
    pub bus_dispatch_threads: usize,

    /// Default deadline applied to workers created through a manager.
    pub worker_timeout: Duration,

    /// Default per-run timeout for tasks built with `with_defaults`.
    pub task_timeout: Duration,

    /// Default retry policy.
    pub retry: RetryPolicy,
}

impl Config {
    /// Returns the effective number of dispatch threads (always at least 1).
    #[inline]
    pub fn dispatch_threads(&self) -> usize {
        match self.bus_dispatch_threads {
            0 => thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            n => n,
        }
    }

    /// Returns the default worker deadline as an `Option`.
    #[inline]
    pub fn default_worker_timeout(&self) -> Option<Duration> {
        Some(self.worker_timeout).filter(|d| !d.is_zero())
    }

    /// Returns the default task deadline as an `Option`.
    #[inline]
    pub fn default_task_timeout(&self) -> Option<Duration> {
        Some(self.task_timeout).filter(|d| !d.is_zero())
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_dispatch_threads = 1` (strict single-threaded delivery)
    /// - `worker_timeout = 0s` (no deadline)
    /// - `task_timeout = 0s` (no deadline)
    /// - `retry = RetryPolicy::default()` (3 retries, exponential from 100ms)
    fn default() -> Self {
        Self {
            bus_dispatch_threads: 1,
            worker_timeout: Duration::ZERO,
            task_timeout: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }
}
