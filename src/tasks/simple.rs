//! # Plain task.
//!
//! [`SimpleTask`] runs its executor once through [`run_once`](crate::tasks::runner::run_once).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tasks::builder::TaskBuilder;
use crate::tasks::runner::{Executor, run_once};
use crate::tasks::state::TaskState;
use crate::tasks::task::{Task, TaskKind, TaskRef, TaskStatus};

/// Task that calls its executor once with its params.
pub struct SimpleTask {
    state: TaskState,
    executor: Executor,
}

impl SimpleTask {
    /// Shorthand for `SimpleTask::builder(name).with_params(params).build(f)`.
    pub fn new<F, Fut>(name: impl Into<Arc<str>>, params: Value, f: F) -> Self
    where
        F: Fn(Value, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        TaskBuilder::new(name).with_params(params).build(f)
    }

    pub fn builder(name: impl Into<Arc<str>>) -> TaskBuilder {
        TaskBuilder::new(name)
    }

    pub(crate) fn from_parts(state: TaskState, executor: Executor) -> Self {
        Self { state, executor }
    }

    /// Wraps the task into a shared [`TaskRef`].
    pub fn into_ref(self) -> TaskRef {
        Arc::new(self)
    }
}

impl fmt::Debug for SimpleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleTask")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for SimpleTask {
    fn state(&self) -> &TaskState {
        &self.state
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Simple
    }

    async fn run(&self) -> Result<TaskStatus, TaskError> {
        run_once(&self.state, &self.executor).await
    }
}
