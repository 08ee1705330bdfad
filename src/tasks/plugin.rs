//! # Plugin-owned task.
//!
//! [`PluginTask`] behaves exactly like a [`SimpleTask`](crate::SimpleTask); the owning plugin
//! name is carried for attribution and lookup (see
//! [`TaskContainer::tasks_by_plugin`](crate::TaskContainer::tasks_by_plugin)).

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

/// Simple task attributed to a plugin.
pub struct PluginTask {
    state: TaskState,
    executor: Executor,
}

impl PluginTask {
    pub fn new<F, Fut>(
        name: impl Into<Arc<str>>,
        plugin: impl Into<Arc<str>>,
        params: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Value, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        TaskBuilder::new(name)
            .with_params(params)
            .build_plugin(plugin, f)
    }

    pub(crate) fn from_parts(state: TaskState, executor: Executor) -> Self {
        Self { state, executor }
    }

    /// Owning plugin.
    pub fn plugin(&self) -> &str {
        self.state.plugin().unwrap_or_default()
    }

    pub fn into_ref(self) -> TaskRef {
        Arc::new(self)
    }
}

impl fmt::Debug for PluginTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginTask")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for PluginTask {
    fn state(&self) -> &TaskState {
        &self.state
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Plugin
    }

    async fn run(&self) -> Result<TaskStatus, TaskError> {
        run_once(&self.state, &self.executor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_plugin_task_runs_like_simple() {
        let task = PluginTask::new("capture", "camera", json!({"frames": 3}), |p, _| async move {
            Ok(p["frames"].clone())
        });
        assert_eq!(task.plugin(), "camera");
        assert_eq!(task.plugin_name(), Some("camera"));
        assert_eq!(task.kind(), TaskKind::Plugin);
        assert_eq!(task.run().await, Ok(TaskStatus::Completed));
        assert_eq!(task.result(), Some(json!(3)));
    }
}
