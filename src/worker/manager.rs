//! # Group of workers sharing a result type.
//!
//! [`AsyncWorkerManager`] creates workers, tracks them in a spin-locked list and offers
//! group-wide waiting and cancellation. The list lock is held only to push, snapshot or prune,
//! never across an await.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{TaskError, WorkerError};
use crate::sync::SpinCell;
use crate::worker::worker::{AsyncWorker, WorkerState};

/// Tracks a set of [`AsyncWorker`]s.
pub struct AsyncWorkerManager<T> {
    workers: SpinCell<Vec<AsyncWorker<T>>>,
    default_timeout: Option<Duration>,
}

impl<T> Default for AsyncWorkerManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncWorkerManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Empty manager; workers wait without deadline.
    pub fn new() -> Self {
        Self {
            workers: SpinCell::new(Vec::new()),
            default_timeout: None,
        }
    }

    /// Empty manager whose workers inherit `config.worker_timeout`.
    pub fn with_config(config: &Config) -> Self {
        Self {
            workers: SpinCell::new(Vec::new()),
            default_timeout: config.default_worker_timeout(),
        }
    }

    fn prepare(&self) -> AsyncWorker<T> {
        let worker = AsyncWorker::new();
        if let Some(d) = self.default_timeout {
            worker.set_timeout(d);
        }
        worker
    }

    fn track(&self, worker: &AsyncWorker<T>) {
        self.workers.lock().push(worker.clone());
    }

    /// Starts `f` on a new tracked worker.
    pub fn create_worker<F, Fut>(&self, f: F) -> Result<AsyncWorker<T>, WorkerError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let worker = self.prepare();
        worker.start_async(f)?;
        self.track(&worker);
        Ok(worker)
    }

    /// Starts blocking `f` on a new tracked worker.
    pub fn create_blocking_worker<F>(&self, f: F) -> Result<AsyncWorker<T>, WorkerError>
    where
        F: FnOnce(CancellationToken) -> Result<T, TaskError> + Send + 'static,
    {
        let worker = self.prepare();
        worker.start_blocking(f)?;
        self.track(&worker);
        Ok(worker)
    }

    fn snapshot(&self) -> Vec<AsyncWorker<T>> {
        self.workers.lock().clone()
    }

    /// Waits for every tracked worker; returns their final states in creation order.
    pub async fn wait_for_all(&self) -> Vec<WorkerState> {
        let workers = self.snapshot();
        let mut states = Vec::with_capacity(workers.len());
        for w in &workers {
            states.push(w.wait_for_completion().await);
        }
        states
    }

    /// True if every tracked worker has finished (vacuously true when empty).
    pub fn all_done(&self) -> bool {
        self.workers.lock().iter().all(AsyncWorker::is_done)
    }

    /// Cancels every unfinished worker; returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self
            .snapshot()
            .iter()
            .filter(|w| w.cancel())
            .count();
        if cancelled > 0 {
            tracing::debug!(cancelled, "cancelled workers");
        }
        cancelled
    }

    /// Drops finished workers from tracking; returns how many were removed.
    pub fn remove_completed(&self) -> usize {
        let mut workers = self.workers.lock();
        let before = workers.len();
        workers.retain(|w| !w.is_done());
        before - workers.len()
    }

    /// Number of tracked workers.
    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    /// True when no worker is tracked.
    pub fn is_empty(&self) -> bool {
        self.workers.lock().is_empty()
    }
}
