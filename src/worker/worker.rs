//! # Single asynchronous unit of work.
//!
//! [`AsyncWorker`] runs one closure on the tokio runtime and exposes its outcome through a small
//! state machine:
//!
//! ```text
//! Idle ──start_async/start_blocking──► Running ──Ok──────────► Completed ─► callback(&value)
//!   │                                     ├──Err/panic──────► Failed
//!   │                                     ├──deadline hit───► TimedOut   (token tripped)
//!   └──────────────cancel()───────────────┴──cancel()───────► Cancelled  (token tripped)
//! ```
//!
//! ## Rules
//! - Terminal states never change; a result arriving after `TimedOut`/`Cancelled` is discarded.
//! - Cancellation and timeout are cooperative: the body receives a [`CancellationToken`] and is
//!   expected to observe it. The body itself is never aborted.
//! - The callback runs at most once, and only on `Completed`.
//! - `get_result` can be called any number of times; it clones the stored value.
//!
//! Starting a worker spawns onto the current tokio runtime, so `start_*` must be called from
//! within one.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::{TaskError, WorkerError, panic_message};

/// Lifecycle state of an [`AsyncWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Created, not started.
    Idle,
    /// Body is executing.
    Running,
    /// Body returned a value.
    Completed,
    /// Body returned an error or panicked.
    Failed,
    /// `wait_for_completion` deadline expired first.
    TimedOut,
    /// Cancelled before the body finished.
    Cancelled,
}

impl WorkerState {
    /// True for states that never change again.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkerState::Idle | WorkerState::Running)
    }

    /// Short stable label for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Completed => "completed",
            WorkerState::Failed => "failed",
            WorkerState::TimedOut => "timed_out",
            WorkerState::Cancelled => "cancelled",
        }
    }
}

type Callback<T> = Box<dyn FnOnce(&T) + Send>;

struct Outcome<T> {
    value: Option<T>,
    error: Option<WorkerError>,
    callback: Option<Callback<T>>,
}

struct Inner<T> {
    state: watch::Sender<WorkerState>,
    outcome: Mutex<Outcome<T>>,
    timeout: Mutex<Option<Duration>>,
    token: CancellationToken,
}

impl<T> Inner<T> {
    /// Moves to `to` if the current state is one of `from`. Atomic with respect to other
    /// transitions.
    fn transition(&self, from: &[WorkerState], to: WorkerState) -> bool {
        self.state.send_if_modified(|s| {
            if from.contains(s) {
                *s = to;
                true
            } else {
                false
            }
        })
    }

    fn state(&self) -> WorkerState {
        *self.state.borrow()
    }
}

/// Handle to one asynchronous unit of work.
///
/// Cloning yields another handle to the same worker.
pub struct AsyncWorker<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for AsyncWorker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for AsyncWorker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncWorker")
            .field("state", &self.inner.state())
            .field("timeout", &*self.inner.timeout.lock())
            .finish_non_exhaustive()
    }
}

impl<T> Default for AsyncWorker<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncWorker<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an idle worker.
    pub fn new() -> Self {
        let (state, _rx) = watch::channel(WorkerState::Idle);
        Self {
            inner: Arc::new(Inner {
                state,
                outcome: Mutex::new(Outcome {
                    value: None,
                    error: None,
                    callback: None,
                }),
                timeout: Mutex::new(None),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Starts `f` as a tokio task.
    ///
    /// Returns [`WorkerError::InvalidState`] unless the worker is `Idle`.
    pub fn start_async<F, Fut>(&self, f: F) -> Result<(), WorkerError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        self.begin("start_async")?;
        let inner = Arc::clone(&self.inner);
        let token = self.inner.token.clone();
        tokio::spawn(async move {
            let res = AssertUnwindSafe(async move { f(token).await })
                .catch_unwind()
                .await
                .map_err(|p| panic_message(&*p));
            finish(&inner, res);
        });
        Ok(())
    }

    /// Starts `f` on the blocking thread pool.
    ///
    /// Returns [`WorkerError::InvalidState`] unless the worker is `Idle`.
    pub fn start_blocking<F>(&self, f: F) -> Result<(), WorkerError>
    where
        F: FnOnce(CancellationToken) -> Result<T, TaskError> + Send + 'static,
    {
        self.begin("start_blocking")?;
        let inner = Arc::clone(&self.inner);
        let token = self.inner.token.clone();
        tokio::task::spawn_blocking(move || {
            let res = std::panic::catch_unwind(AssertUnwindSafe(move || f(token)))
                .map_err(|p| panic_message(&*p));
            finish(&inner, res);
        });
        Ok(())
    }

    fn begin(&self, op: &'static str) -> Result<(), WorkerError> {
        if self
            .inner
            .transition(&[WorkerState::Idle], WorkerState::Running)
        {
            Ok(())
        } else {
            Err(WorkerError::InvalidState {
                op,
                state: self.inner.state(),
            })
        }
    }

    /// Registers the completion callback, replacing any previous one.
    ///
    /// If the worker has already completed, the callback runs immediately on the caller's thread.
    pub fn set_callback<C>(&self, cb: C)
    where
        C: FnOnce(&T) + Send + 'static,
    {
        let mut out = self.inner.outcome.lock();
        if self.inner.state() == WorkerState::Completed {
            let value = out.value.clone();
            drop(out);
            if let Some(v) = value {
                run_callback(Box::new(cb), &v);
            }
            return;
        }
        out.callback = Some(Box::new(cb));
    }

    /// Sets the deadline applied by [`wait_for_completion`](Self::wait_for_completion).
    pub fn set_timeout(&self, timeout: Duration) {
        *self.inner.timeout.lock() = Some(timeout).filter(|d| !d.is_zero());
    }

    /// Currently configured deadline.
    pub fn timeout(&self) -> Option<Duration> {
        *self.inner.timeout.lock()
    }

    /// Waits until the worker reaches a terminal state and returns it.
    ///
    /// With a deadline configured, a worker still running when it expires becomes `TimedOut`
    /// and its token is tripped. An idle worker returns `Idle` immediately.
    pub async fn wait_for_completion(&self) -> WorkerState {
        if self.inner.state() == WorkerState::Idle {
            return WorkerState::Idle;
        }
        let deadline = self.timeout();
        match deadline {
            Some(d) => match time::timeout(d, self.settled()).await {
                Ok(state) => state,
                Err(_elapsed) => {
                    self.expire(d);
                    self.inner.state()
                }
            },
            None => self.settled().await,
        }
    }

    async fn settled(&self) -> WorkerState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.inner.state(),
        }
    }

    fn expire(&self, timeout: Duration) {
        let mut out = self.inner.outcome.lock();
        if self
            .inner
            .transition(&[WorkerState::Running], WorkerState::TimedOut)
        {
            out.error = Some(WorkerError::Timeout { timeout });
            out.callback = None;
            drop(out);
            self.inner.token.cancel();
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "worker timed out");
        }
    }

    /// Returns a clone of the produced value.
    ///
    /// [`WorkerError::InvalidState`] unless the worker is `Completed`.
    pub fn get_result(&self) -> Result<T, WorkerError> {
        let out = self.inner.outcome.lock();
        let state = self.inner.state();
        match (state, out.value.as_ref()) {
            (WorkerState::Completed, Some(v)) => Ok(v.clone()),
            _ => Err(WorkerError::InvalidState {
                op: "get_result",
                state,
            }),
        }
    }

    /// Waits for completion, then returns the value or the error that ended the worker.
    pub async fn result(&self) -> Result<T, WorkerError> {
        match self.wait_for_completion().await {
            WorkerState::Completed => self.get_result(),
            state => Err(self.error().unwrap_or(WorkerError::InvalidState {
                op: "result",
                state,
            })),
        }
    }

    /// Requests cooperative cancellation.
    ///
    /// Returns `true` if the worker moved to `Cancelled`, `false` if it had already finished.
    pub fn cancel(&self) -> bool {
        let mut out = self.inner.outcome.lock();
        let moved = self.inner.transition(
            &[WorkerState::Idle, WorkerState::Running],
            WorkerState::Cancelled,
        );
        if moved {
            out.error = Some(WorkerError::Cancelled);
            out.callback = None;
        }
        drop(out);
        if moved {
            self.inner.token.cancel();
        }
        moved
    }

    /// Current state (snapshot).
    pub fn state(&self) -> WorkerState {
        self.inner.state()
    }

    /// True once the worker reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.inner.state().is_terminal()
    }

    /// The error that ended the worker, if any.
    pub fn error(&self) -> Option<WorkerError> {
        self.inner.outcome.lock().error.clone()
    }

    /// Token handed to the body. Tripped on cancel and timeout.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

/// Records the body's outcome unless the worker already left `Running`.
fn finish<T: Clone>(inner: &Inner<T>, res: Result<Result<T, TaskError>, String>) {
    let mut out = inner.outcome.lock();
    match res {
        Ok(Ok(value)) => {
            if !inner.transition(&[WorkerState::Running], WorkerState::Completed) {
                tracing::debug!(state = inner.state().as_label(), "late worker result discarded");
                return;
            }
            let cb = out.callback.take();
            let copy = cb.as_ref().map(|_| value.clone());
            out.value = Some(value);
            drop(out);
            if let (Some(cb), Some(v)) = (cb, copy) {
                run_callback(cb, &v);
            }
        }
        Ok(Err(TaskError::Canceled)) if inner.token.is_cancelled() => {
            if inner.transition(&[WorkerState::Running], WorkerState::Cancelled) {
                out.error = Some(WorkerError::Cancelled);
            }
        }
        Ok(Err(err)) => {
            if inner.transition(&[WorkerState::Running], WorkerState::Failed) {
                tracing::debug!(label = err.as_label(), error = %err, "worker failed");
                out.error = Some(WorkerError::Failed(err));
            }
        }
        Err(panic) => {
            if inner.transition(&[WorkerState::Running], WorkerState::Failed) {
                tracing::error!(panic = %panic, "worker body panicked");
                out.error = Some(WorkerError::Panicked(panic));
            }
        }
    }
}

fn run_callback<T>(cb: Callback<T>, value: &T) {
    if let Err(p) = std::panic::catch_unwind(AssertUnwindSafe(|| cb(value))) {
        tracing::error!(panic = %panic_message(&*p), "worker callback panicked");
    }
}
