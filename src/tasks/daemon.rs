//! # Long-running daemon task.
//!
//! [`DaemonTask`] repeats its loop body on an [`AsyncWorker`] until stopped.
//!
//! ```text
//! run()  ── Pending → Running ──► worker: loop { body(token) } while !token.is_cancelled()
//!                                         └─ body Err/panic ─► Failed, on_terminate(err)
//! stop() ── publish StopRequested ── token.cancel() ── await current iteration ──► Completed
//! cancel() ── Cancelled, token tripped; the loop exits after its current iteration
//! ```
//!
//! ## Rules
//! - `run` returns as soon as the loop is started, with `Ok(TaskStatus::Running)`.
//! - The stop flag is the task's cancellation token; the body receives it and may use it to cut
//!   a long iteration short, but it is never interrupted from outside.
//! - After a clean stop the result is `{"iterations": n}`.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::{TaskError, panic_message};
use crate::events::TaskEventKind;
use crate::tasks::builder::TaskBuilder;
use crate::tasks::state::TaskState;
use crate::tasks::task::{Task, TaskKind, TaskRef, TaskStatus};
use crate::worker::AsyncWorker;

type LoopBody =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync>;

/// Task repeating a loop body until stopped.
pub struct DaemonTask {
    state: Arc<TaskState>,
    body: LoopBody,
    worker: Mutex<Option<AsyncWorker<()>>>,
    iterations: Arc<AtomicU64>,
}

impl DaemonTask {
    pub fn new<F, Fut>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        TaskBuilder::new(name).build_daemon(body)
    }

    pub(crate) fn from_parts<F, Fut>(state: TaskState, body: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self {
            state: Arc::new(state),
            body: Arc::new(move |token| body(token).boxed()),
            worker: Mutex::new(None),
            iterations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Completed loop iterations so far.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// True while the loop is running.
    pub fn is_alive(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|w| !w.is_done())
    }

    /// Asks the loop to stop, waits for the current iteration, then marks the task `Completed`.
    ///
    /// Returns the final status; a loop that failed meanwhile stays `Failed`.
    /// `InvalidState` if the daemon was never started.
    pub async fn stop(&self) -> Result<TaskStatus, TaskError> {
        let status = self.state.status();
        match status {
            TaskStatus::Pending => {
                return Err(TaskError::InvalidState { op: "stop", status });
            }
            TaskStatus::Running => {}
            terminal => return Ok(terminal),
        }

        self.state
            .publish(self.state.event(TaskEventKind::StopRequested));
        self.state.token().cancel();

        let worker = self.worker.lock().clone();
        if let Some(w) = worker {
            w.wait_for_completion().await;
        }
        Ok(self
            .state
            .complete(json!({ "iterations": self.iterations() })))
    }

    pub fn into_ref(self) -> TaskRef {
        Arc::new(self)
    }
}

impl fmt::Debug for DaemonTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonTask")
            .field("state", &self.state)
            .field("iterations", &self.iterations())
            .finish_non_exhaustive()
    }
}

async fn daemon_loop(
    state: Arc<TaskState>,
    body: LoopBody,
    iterations: Arc<AtomicU64>,
    stop: CancellationToken,
) -> Result<(), TaskError> {
    while !stop.is_cancelled() {
        let outcome = AssertUnwindSafe(body(stop.clone())).catch_unwind().await;
        let err = match outcome {
            Ok(Ok(())) => {
                iterations.fetch_add(1, Ordering::Relaxed);
                tokio::task::yield_now().await;
                continue;
            }
            Ok(Err(TaskError::Canceled)) if stop.is_cancelled() => break,
            Ok(Err(e)) => e,
            Err(p) => TaskError::fatal(format!("loop body panicked: {}", panic_message(&*p))),
        };
        state.fail(err.clone());
        return Err(err);
    }
    tracing::debug!(
        task = state.name(),
        iterations = iterations.load(Ordering::Relaxed),
        "daemon loop exited"
    );
    Ok(())
}

#[async_trait]
impl Task for DaemonTask {
    fn state(&self) -> &TaskState {
        &self.state
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Daemon
    }

    async fn run(&self) -> Result<TaskStatus, TaskError> {
        self.state.begin("run")?;

        let worker = AsyncWorker::new();
        let state = Arc::clone(&self.state);
        let body = Arc::clone(&self.body);
        let iterations = Arc::clone(&self.iterations);
        let stop = self.state.token();
        *self.worker.lock() = Some(worker.clone());
        if let Err(e) = worker.start_async(move |_| daemon_loop(state, body, iterations, stop)) {
            return Ok(self.state.fail(TaskError::fatal(e.to_string())));
        }
        Ok(TaskStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_then_stop_completes() {
        let daemon = DaemonTask::new("poll", |_| async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(())
        });
        assert_eq!(daemon.run().await, Ok(TaskStatus::Running));
        assert_eq!(daemon.status(), TaskStatus::Running);

        while daemon.iterations() < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(daemon.is_alive());

        assert_eq!(daemon.stop().await, Ok(TaskStatus::Completed));
        assert!(!daemon.is_alive());
        let n = daemon.iterations();
        assert!(n >= 3);
        assert_eq!(daemon.result(), Some(json!({ "iterations": n })));
    }

    #[tokio::test]
    async fn test_stop_waits_for_current_iteration() {
        let finished = Arc::new(AtomicUsize::new(0));
        let daemon = {
            let finished = Arc::clone(&finished);
            DaemonTask::new("slow", move |_| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };
        daemon.run().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(daemon.stop().await, Ok(TaskStatus::Completed));
        assert_eq!(finished.load(Ordering::SeqCst) as u64, daemon.iterations());
        assert!(daemon.iterations() >= 1);
    }

    #[tokio::test]
    async fn test_failing_iteration_fails_task() {
        let hits = Arc::new(AtomicUsize::new(0));
        let daemon = {
            let hits = Arc::clone(&hits);
            TaskBuilder::new("watchdog")
                .on_terminate(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
                .build_daemon(|_| async { Err(TaskError::fail("heartbeat lost")) })
        };
        daemon.run().await.unwrap();
        while daemon.status() == TaskStatus::Running {
            tokio::task::yield_now().await;
        }
        assert_eq!(daemon.status(), TaskStatus::Failed);
        assert_eq!(daemon.error(), Some(TaskError::fail("heartbeat lost")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(daemon.stop().await, Ok(TaskStatus::Failed));
    }

    #[tokio::test]
    async fn test_stop_before_run_is_rejected() {
        let daemon = DaemonTask::new("idle", |_| async { Ok(()) });
        assert!(matches!(
            daemon.stop().await,
            Err(TaskError::InvalidState { op: "stop", .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_ends_loop() {
        let daemon = DaemonTask::new("spin", |tok| async move {
            tokio::select! {
                _ = tok.cancelled() => Err(TaskError::Canceled),
                _ = tokio::time::sleep(Duration::from_millis(1)) => Ok(()),
            }
        });
        daemon.run().await.unwrap();
        assert!(daemon.cancel());
        assert_eq!(daemon.status(), TaskStatus::Cancelled);
        assert_eq!(daemon.stop().await, Ok(TaskStatus::Cancelled));
    }
}
