//! Retry timing policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Wiring
//! ```text
//! RetryPolicy { max_retries, backoff: BackoffPolicy }
//!      └─► worker::async_retry sleeps backoff.next(attempt) between attempts
//!            └─► jitter.sample(nominal, floor, cap) picks the sleep inside jitter.window(..)
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=100ms, factor=2.0, max=30s, jitter=None.
//! - `JitterPolicy::None`; consider `Equal` when many workers retry the same device.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
