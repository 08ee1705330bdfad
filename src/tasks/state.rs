//! # Task lifecycle record.
//!
//! [`TaskState`] holds everything a task variant shares: identity, params, status, outcome,
//! the cancellation token, the failure hook and the optional bus used for lifecycle events.
//!
//! ## Rules
//! - Status and outcome live under one reader-writer lock; readers never wait on an executor.
//! - Transitions are checked: `Pending → Running → {Completed, Failed}`, `Cancelled` from
//!   `Pending` or `Running`. Anything else is refused.
//! - `result` is set iff `Completed`; `error` is set iff `Failed`.
//! - The failure hook runs exactly once per failure, after the lock is released.
//! - A late result or error for a task that was cancelled meanwhile is discarded.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{TaskError, panic_message};
use crate::events::{MessageBus, TaskEvent, TaskEventKind};
use crate::tasks::task::TaskStatus;

/// Callback invoked with the error of a failed task.
pub type TerminateHook = Arc<dyn Fn(&TaskError) + Send + Sync>;

struct Record {
    params: Value,
    status: TaskStatus,
    result: Option<Value>,
    error: Option<TaskError>,
}

/// Lifecycle record shared by every task variant.
pub struct TaskState {
    name: Arc<str>,
    plugin: Option<Arc<str>>,
    record: RwLock<Record>,
    token: CancellationToken,
    timeout: Option<Duration>,
    required: Vec<String>,
    on_terminate: Option<TerminateHook>,
    bus: Option<MessageBus>,
}

impl fmt::Debug for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rec = self.record.read();
        f.debug_struct("TaskState")
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .field("status", &rec.status)
            .field("params", &rec.params)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TaskState {
    pub(crate) fn new(
        name: Arc<str>,
        params: Value,
        plugin: Option<Arc<str>>,
        timeout: Option<Duration>,
        required: Vec<String>,
        on_terminate: Option<TerminateHook>,
        bus: Option<MessageBus>,
    ) -> Self {
        Self {
            name,
            plugin,
            record: RwLock::new(Record {
                params,
                status: TaskStatus::Pending,
                result: None,
                error: None,
            }),
            token: CancellationToken::new(),
            timeout,
            required,
            on_terminate,
            bus,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    pub fn status(&self) -> TaskStatus {
        self.record.read().status
    }

    pub fn params(&self) -> Value {
        self.record.read().params.clone()
    }

    /// Replaces the params. Takes effect for a run that has not started yet.
    pub fn set_params(&self, params: Value) {
        self.record.write().params = params;
    }

    /// Edits the params in place under the write lock.
    pub fn update_params<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.record.write().params)
    }

    pub fn result(&self) -> Option<Value> {
        self.record.read().result.clone()
    }

    pub fn error(&self) -> Option<TaskError> {
        self.record.read().error.clone()
    }

    /// Token handed to the executor; tripped by `cancel` and by timeouts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Per-run deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Keys that must be present in an object `params` before the executor runs.
    pub fn required_params(&self) -> &[String] {
        &self.required
    }

    /// `Pending → Running`; returns the params snapshot for the executor.
    pub fn begin(&self, op: &'static str) -> Result<Value, TaskError> {
        let mut rec = self.record.write();
        if rec.status != TaskStatus::Pending {
            return Err(TaskError::InvalidState {
                op,
                status: rec.status,
            });
        }
        rec.status = TaskStatus::Running;
        let params = rec.params.clone();
        drop(rec);
        tracing::debug!(task = %self.name, "task started");
        self.publish(self.event(TaskEventKind::Started));
        Ok(params)
    }

    /// `Running → Completed` with `value`. Returns the resulting status.
    pub fn complete(&self, value: Value) -> TaskStatus {
        let mut rec = self.record.write();
        if rec.status != TaskStatus::Running {
            tracing::debug!(
                task = %self.name,
                status = rec.status.as_label(),
                "late result discarded"
            );
            return rec.status;
        }
        rec.status = TaskStatus::Completed;
        rec.result = Some(value);
        drop(rec);
        tracing::debug!(task = %self.name, "task completed");
        self.publish(self.event(TaskEventKind::Completed));
        TaskStatus::Completed
    }

    /// `Pending → Completed` with a `null` result, without running anything.
    pub fn skip(&self, reason: &str) -> Result<TaskStatus, TaskError> {
        let mut rec = self.record.write();
        if rec.status != TaskStatus::Pending {
            return Err(TaskError::InvalidState {
                op: "run",
                status: rec.status,
            });
        }
        rec.status = TaskStatus::Completed;
        rec.result = Some(Value::Null);
        drop(rec);
        tracing::debug!(task = %self.name, reason, "task skipped");
        self.publish(self.event(TaskEventKind::Skipped).with_reason(reason));
        Ok(TaskStatus::Completed)
    }

    /// `Running → Failed` with `err`, then runs the failure hook. Returns the resulting status.
    pub fn fail(&self, err: TaskError) -> TaskStatus {
        let mut rec = self.record.write();
        if rec.status != TaskStatus::Running {
            tracing::debug!(
                task = %self.name,
                status = rec.status.as_label(),
                error = %err,
                "late error discarded"
            );
            return rec.status;
        }
        rec.status = TaskStatus::Failed;
        rec.error = Some(err.clone());
        drop(rec);

        tracing::warn!(task = %self.name, label = err.as_label(), error = %err, "task failed");
        if let TaskError::Timeout { timeout } = &err {
            self.publish(self.event(TaskEventKind::TimeoutHit).with_timeout(*timeout));
        }
        self.publish(self.event(TaskEventKind::Failed).with_reason(err.to_string()));

        if let Some(hook) = &self.on_terminate {
            if let Err(p) = std::panic::catch_unwind(AssertUnwindSafe(|| hook(&err))) {
                tracing::error!(
                    task = %self.name,
                    panic = %panic_message(&*p),
                    "on_terminate panicked"
                );
            }
        }
        TaskStatus::Failed
    }

    /// `Pending | Running → Cancelled` and trips the token.
    pub fn cancel(&self) -> bool {
        let mut rec = self.record.write();
        if !matches!(rec.status, TaskStatus::Pending | TaskStatus::Running) {
            return false;
        }
        rec.status = TaskStatus::Cancelled;
        drop(rec);
        self.token.cancel();
        tracing::debug!(task = %self.name, "task cancelled");
        self.publish(self.event(TaskEventKind::Cancelled));
        true
    }

    /// Verifies `params` carries every required key.
    pub(crate) fn check_required(&self, params: &Value) -> Result<(), TaskError> {
        if self.required.is_empty() {
            return Ok(());
        }
        let Some(obj) = params.as_object() else {
            return Err(TaskError::argument_mismatch(format!(
                "expected an object with {:?}, got {}",
                self.required,
                kind_of(params)
            )));
        };
        match self.required.iter().find(|k| !obj.contains_key(k.as_str())) {
            Some(missing) => Err(TaskError::argument_mismatch(format!(
                "missing parameter {missing:?}"
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn event(&self, kind: TaskEventKind) -> TaskEvent {
        let ev = TaskEvent::new(kind, Arc::clone(&self.name));
        match &self.plugin {
            Some(p) => ev.with_plugin(Arc::clone(p)),
            None => ev,
        }
    }

    pub(crate) fn publish(&self, ev: TaskEvent) {
        let Some(bus) = &self.bus else {
            return;
        };
        if let Err(e) = bus.publish(&self.name, ev) {
            tracing::trace!(task = %self.name, error = %e, "task event dropped");
        }
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state(required: &[&str], hook: Option<TerminateHook>) -> TaskState {
        TaskState::new(
            Arc::from("t"),
            json!({"exposure": 1.5}),
            None,
            None,
            required.iter().map(|s| s.to_string()).collect(),
            hook,
            None,
        )
    }

    #[test]
    fn test_transitions_are_checked() {
        let s = state(&[], None);
        assert_eq!(s.complete(json!(1)), TaskStatus::Pending);
        assert_eq!(s.begin("run"), Ok(json!({"exposure": 1.5})));
        assert_eq!(
            s.begin("run"),
            Err(TaskError::InvalidState {
                op: "run",
                status: TaskStatus::Running
            })
        );
        assert_eq!(s.complete(json!(1)), TaskStatus::Completed);
        assert_eq!(s.result(), Some(json!(1)));
        assert_eq!(s.error(), None);
        assert!(!s.cancel());
    }

    #[test]
    fn test_failure_runs_hook_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hook: TerminateHook = {
            let hits = Arc::clone(&hits);
            Arc::new(move |e: &TaskError| {
                assert_eq!(e, &TaskError::fail("jammed"));
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let s = state(&[], Some(hook));
        s.begin("run").unwrap();
        assert_eq!(s.fail(TaskError::fail("jammed")), TaskStatus::Failed);
        assert_eq!(s.fail(TaskError::fail("again")), TaskStatus::Failed);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(s.result(), None);
        assert_eq!(s.error(), Some(TaskError::fail("jammed")));
    }

    #[test]
    fn test_cancel_discards_late_outcome() {
        let s = state(&[], None);
        s.begin("run").unwrap();
        assert!(s.cancel());
        assert!(s.token().is_cancelled());
        assert_eq!(s.complete(json!("late")), TaskStatus::Cancelled);
        assert_eq!(s.result(), None);
    }

    #[test]
    fn test_required_params() {
        let s = state(&["exposure", "binning"], None);
        let err = s.check_required(&s.params()).unwrap_err();
        assert_eq!(err, TaskError::argument_mismatch("missing parameter \"binning\""));
        assert!(s.check_required(&json!({"exposure": 1, "binning": 2})).is_ok());
        assert_eq!(
            s.check_required(&json!([1, 2])).unwrap_err().as_label(),
            "task_argument_mismatch"
        );
    }

    #[test]
    fn test_update_params_in_place() {
        let s = state(&[], None);
        s.update_params(|p| p["gain"] = json!(100));
        assert_eq!(s.params(), json!({"exposure": 1.5, "gain": 100}));
    }
}
