//! # Fluent construction of tasks.
//!
//! [`TaskBuilder`] collects the options every variant shares and finishes with one of the
//! `build*` methods:
//!
//! ```rust
//! use std::time::Duration;
//! use serde_json::json;
//! use taskcore::{Config, SimpleTask, Task};
//!
//! let cfg = Config { task_timeout: Duration::from_secs(5), ..Config::default() };
//! let task = SimpleTask::builder("expose")
//!     .with_params(json!({"exposure": 2.0}))
//!     .with_required_params(["exposure"])
//!     .with_defaults(&cfg)
//!     .on_terminate(|err| eprintln!("expose failed: {err}"))
//!     .build(|params, _ctx| async move { Ok(params["exposure"].clone()) });
//!
//! assert_eq!(task.name(), "expose");
//! assert_eq!(task.state().timeout(), Some(Duration::from_secs(5)));
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::TaskError;
use crate::events::MessageBus;
use crate::tasks::conditional::ConditionalTask;
use crate::tasks::daemon::DaemonTask;
use crate::tasks::plugin::PluginTask;
use crate::tasks::runner::executor;
use crate::tasks::simple::SimpleTask;
use crate::tasks::state::{TaskState, TerminateHook};

/// Builder shared by all task variants.
#[derive(Clone)]
pub struct TaskBuilder {
    name: Arc<str>,
    params: Value,
    timeout: Option<Duration>,
    required: Vec<String>,
    on_terminate: Option<TerminateHook>,
    bus: Option<MessageBus>,
}

impl TaskBuilder {
    /// Creates a builder for a task called `name` with `null` params.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            params: Value::Null,
            timeout: None,
            required: Vec::new(),
            on_terminate: None,
            bus: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Per-run deadline; zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout).filter(|d| !d.is_zero());
        self
    }

    /// Keys the params object must contain; checked before the executor runs.
    pub fn with_required_params<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Hook called once with the error when the task fails.
    pub fn on_terminate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskError) + Send + Sync + 'static,
    {
        self.on_terminate = Some(Arc::new(hook));
        self
    }

    /// Publishes lifecycle [`TaskEvent`](crate::TaskEvent)s on `bus`, topic = task name.
    pub fn with_bus(mut self, bus: &MessageBus) -> Self {
        self.bus = Some(bus.clone());
        self
    }

    /// Fills unset options from `config` (currently the task timeout).
    pub fn with_defaults(mut self, config: &Config) -> Self {
        if self.timeout.is_none() {
            self.timeout = config.default_task_timeout();
        }
        self
    }

    fn into_state(self, plugin: Option<Arc<str>>) -> TaskState {
        TaskState::new(
            self.name,
            self.params,
            plugin,
            self.timeout,
            self.required,
            self.on_terminate,
            self.bus,
        )
    }

    /// Finishes as a [`SimpleTask`].
    pub fn build<F, Fut>(self, f: F) -> SimpleTask
    where
        F: Fn(Value, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        SimpleTask::from_parts(self.into_state(None), executor(f))
    }

    /// Finishes as a [`ConditionalTask`] gated by `condition`.
    pub fn build_conditional<C, F, Fut>(self, condition: C, f: F) -> ConditionalTask
    where
        C: Fn(&Value) -> bool + Send + Sync + 'static,
        F: Fn(Value, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        ConditionalTask::from_parts(self.into_state(None), Arc::new(condition), executor(f))
    }

    /// Finishes as a [`PluginTask`] owned by `plugin`.
    pub fn build_plugin<F, Fut>(self, plugin: impl Into<Arc<str>>, f: F) -> PluginTask
    where
        F: Fn(Value, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        PluginTask::from_parts(self.into_state(Some(plugin.into())), executor(f))
    }

    /// Finishes as a [`DaemonTask`] repeating `body` until stopped.
    ///
    /// The timeout and required params options do not apply to daemons.
    pub fn build_daemon<F, Fut>(self, body: F) -> DaemonTask
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        DaemonTask::from_parts(self.into_state(None), body)
    }
}
