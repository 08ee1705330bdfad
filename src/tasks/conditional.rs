//! # Conditionally executed task.
//!
//! [`ConditionalTask`] evaluates its condition against the params when run:
//!
//! ```text
//! run() ──► force || condition(params) ──true──► run_once (like SimpleTask)
//!                        └──────────────false──► Pending → Completed, result = null
//! ```
//!
//! A skipped task never calls its executor and never fails.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tasks::builder::TaskBuilder;
use crate::tasks::runner::{Executor, run_once};
use crate::tasks::state::TaskState;
use crate::tasks::task::{Task, TaskKind, TaskRef, TaskStatus};

type Condition = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Task gated by a predicate over its params.
pub struct ConditionalTask {
    state: TaskState,
    condition: Condition,
    executor: Executor,
    force: AtomicBool,
}

impl ConditionalTask {
    pub fn new<C, F, Fut>(name: impl Into<Arc<str>>, params: Value, condition: C, f: F) -> Self
    where
        C: Fn(&Value) -> bool + Send + Sync + 'static,
        F: Fn(Value, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        TaskBuilder::new(name)
            .with_params(params)
            .build_conditional(condition, f)
    }

    pub(crate) fn from_parts(state: TaskState, condition: Condition, executor: Executor) -> Self {
        Self {
            state,
            condition,
            executor,
            force: AtomicBool::new(false),
        }
    }

    /// Forces execution regardless of the condition.
    pub fn set_force(&self, force: bool) {
        self.force.store(force, Ordering::Release);
    }

    /// Builder-style [`set_force`](Self::set_force).
    pub fn forced(self, force: bool) -> Self {
        self.set_force(force);
        self
    }

    pub fn is_forced(&self) -> bool {
        self.force.load(Ordering::Acquire)
    }

    /// Evaluates the condition against the current params.
    pub fn should_run(&self) -> bool {
        self.is_forced() || (self.condition)(&self.state.params())
    }

    pub fn into_ref(self) -> TaskRef {
        Arc::new(self)
    }
}

impl fmt::Debug for ConditionalTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalTask")
            .field("state", &self.state)
            .field("force", &self.is_forced())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for ConditionalTask {
    fn state(&self) -> &TaskState {
        &self.state
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Conditional
    }

    async fn run(&self) -> Result<TaskStatus, TaskError> {
        if !self.should_run() {
            return self.state.skip("condition not met");
        }
        run_once(&self.state, &self.executor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn cooling(temp: f64, calls: &Arc<AtomicUsize>) -> ConditionalTask {
        let calls = Arc::clone(calls);
        ConditionalTask::new(
            "cool",
            json!({"temperature": temp}),
            |p| p["temperature"].as_f64().is_some_and(|t| t > -10.0),
            move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!("cooled")) }
            },
        )
    }

    #[tokio::test]
    async fn test_false_condition_skips_executor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let task = cooling(-20.0, &calls);
        assert_eq!(task.run().await, Ok(TaskStatus::Completed));
        assert_eq!(task.result(), Some(Value::Null));
        assert_eq!(task.error(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_true_condition_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let task = cooling(5.0, &calls);
        assert_eq!(task.run().await, Ok(TaskStatus::Completed));
        assert_eq!(task.result(), Some(json!("cooled")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_overrides_condition() {
        let calls = Arc::new(AtomicUsize::new(0));
        let task = cooling(-20.0, &calls).forced(true);
        assert!(task.should_run());
        assert_eq!(task.run().await, Ok(TaskStatus::Completed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skipped_task_cannot_rerun() {
        let calls = Arc::new(AtomicUsize::new(0));
        let task = cooling(-20.0, &calls);
        task.run().await.unwrap();
        task.set_force(true);
        assert!(task.run().await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
