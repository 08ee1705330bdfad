//! Asynchronous workers and retry.
//!
//! - [`AsyncWorker`] runs one closure with timeout, cancellation and a completion callback.
//! - [`AsyncWorkerManager`] groups workers of one result type.
//! - [`async_retry`] re-runs an operation under a [`RetryPolicy`].

mod manager;
mod retry;
#[allow(clippy::module_inception)]
mod worker;

pub use manager::AsyncWorkerManager;
pub use retry::{RetryPolicy, async_retry, async_retry_with_defaults};
pub use worker::{AsyncWorker, WorkerState};
