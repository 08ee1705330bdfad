//! # Task abstraction.
//!
//! This module defines the [`Task`] trait and its status enums. Every task owns a [`TaskState`]
//! (name, params, status, outcome, cancellation token) and decides how `run` drives it.
//! The common handle type is [`TaskRef`], an `Arc<dyn Task>` shared by containers, stacks and
//! whoever is executing it.
//!
//! ## Lifecycle
//! ```text
//! Pending ──run()──► Running ──Ok──► Completed   (result set)
//!    │                  └─────Err──► Failed      (error set, on_terminate called once)
//!    └──────cancel()────────┴──────► Cancelled   (token tripped)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TaskError;
use crate::tasks::state::TaskState;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Created, not run yet.
    Pending,
    /// Executor (or daemon loop) in progress.
    Running,
    /// Finished successfully.
    Completed,
    /// Executor returned an error.
    Failed,
    /// Cancelled before finishing.
    Cancelled,
}

impl TaskStatus {
    /// True for states that never change again.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Short stable label for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Execution variant of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Runs its executor once.
    Simple,
    /// Runs its executor only if its condition holds or it is forced.
    Conditional,
    /// Repeats a loop body until stopped.
    Daemon,
    /// Simple task attributed to a plugin.
    Plugin,
}

/// # Unit of work with an observable lifecycle.
///
/// Implementors provide the [`TaskState`] and the `run` strategy; everything else has a default
/// that reads the state.
///
/// # Example
/// ```
/// use serde_json::json;
/// use taskcore::{SimpleTask, Task, TaskStatus};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let task = SimpleTask::new("add", json!({"a": 2, "b": 3}), |params, _ctx| async move {
///     let sum = params["a"].as_i64().unwrap_or(0) + params["b"].as_i64().unwrap_or(0);
///     Ok(json!(sum))
/// });
///
/// assert_eq!(task.run().await, Ok(TaskStatus::Completed));
/// assert_eq!(task.result(), Some(json!(5)));
/// # }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Shared lifecycle record.
    fn state(&self) -> &TaskState;

    /// Execution variant.
    fn kind(&self) -> TaskKind;

    /// Drives the task from `Pending`.
    ///
    /// Execution failures are captured into the task and reported as `Ok(TaskStatus::Failed)`.
    /// `Err` is returned only when the task is not in a state that allows running.
    async fn run(&self) -> Result<TaskStatus, TaskError>;

    /// Cooperative cancellation. Returns `false` if the task had already finished.
    fn cancel(&self) -> bool {
        self.state().cancel()
    }

    /// Stable task name.
    fn name(&self) -> &str {
        self.state().name()
    }

    /// Owning plugin, if any.
    fn plugin_name(&self) -> Option<&str> {
        self.state().plugin()
    }

    /// Current status (snapshot).
    fn status(&self) -> TaskStatus {
        self.state().status()
    }

    /// Copy of the current params.
    fn params(&self) -> Value {
        self.state().params()
    }

    /// Result, set iff `Completed`.
    fn result(&self) -> Option<Value> {
        self.state().result()
    }

    /// Error, set iff `Failed`.
    fn error(&self) -> Option<TaskError> {
        self.state().error()
    }
}

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;
