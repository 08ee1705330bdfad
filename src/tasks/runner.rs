//! # Run a single execution of a task.
//!
//! [`run_once`] drives a [`TaskState`] through one executor call:
//!
//! ```text
//! begin() ──► check required params ──► executor(params, token) ──Ok──► complete()
//!    │               └──missing──► fail(ArgumentMismatch)    ├──Err───► fail(err)
//!    └──not Pending──► Err(InvalidState)                      ├──panic─► fail(Fatal)
//!                                                             └──timeout► token.cancel(), fail(Timeout)
//! ```
//!
//! ## Rules
//! - Execution failures are captured into the state and reported as `Ok(TaskStatus::Failed)`.
//! - On timeout the executor future is dropped, which ends it at the `.await` it is parked on,
//!   and the token is cancelled. Work the executor spawned elsewhere sees only the token.
//! - If the task was cancelled while running, the executor's outcome is discarded.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::{TaskError, panic_message};
use crate::tasks::state::TaskState;
use crate::tasks::task::TaskStatus;

/// Type-erased task body: `(params, token) -> result`.
pub type Executor = Arc<
    dyn Fn(Value, CancellationToken) -> BoxFuture<'static, Result<Value, TaskError>> + Send + Sync,
>;

/// Erases a closure into an [`Executor`].
pub fn executor<F, Fut>(f: F) -> Executor
where
    F: Fn(Value, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    Arc::new(move |params, token| f(params, token).boxed())
}

/// Executes `exec` once against `state`.
pub async fn run_once(state: &TaskState, exec: &Executor) -> Result<TaskStatus, TaskError> {
    let params = state.begin("run")?;
    if let Err(e) = state.check_required(&params) {
        return Ok(state.fail(e));
    }

    let token = state.token();
    let fut = AssertUnwindSafe(exec(params, token.clone())).catch_unwind();

    let res = match state.timeout().filter(|d| *d > Duration::ZERO) {
        Some(dur) => match time::timeout(dur, fut).await {
            Ok(r) => r,
            Err(_elapsed) => {
                token.cancel();
                Ok(Err(TaskError::Timeout { timeout: dur }))
            }
        },
        None => fut.await,
    };

    Ok(match res {
        Ok(Ok(value)) => state.complete(value),
        Ok(Err(err)) => state.fail(err),
        Err(panic) => state.fail(TaskError::fatal(format!(
            "executor panicked: {}",
            panic_message(&*panic)
        ))),
    })
}
