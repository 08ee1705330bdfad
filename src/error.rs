//! Error types used by taskcore.
//!
//! Every subsystem owns one enum:
//!
//! - [`TaskError`]: failures of a task execution or misuse of the task lifecycle.
//! - [`WorkerError`]: failures surfaced by [`AsyncWorker`](crate::AsyncWorker).
//! - [`QueueError`]: rejected operations on a closed [`ThreadSafeQueue`](crate::ThreadSafeQueue).
//! - [`BusError`]: publish on a stopped bus, handler failures.
//! - [`ResolverError`]: manifest loading and strict dependency resolution.
//!
//! All of them provide `as_label()`: a short stable label for logs/metrics.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::tasks::TaskStatus;
use crate::worker::WorkerState;

/// # Errors produced by task execution.
///
/// Execution failures (`Fail`, `Fatal`, `Timeout`, `ArgumentMismatch`) are captured into the
/// task's `error` field; they are never re-thrown to the container. `InvalidState` is returned
/// directly to the caller that misused the lifecycle.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task execution exceeded its timeout duration.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Non-recoverable fatal error (should not be retried).
    #[error("fatal error (no retry): {reason}")]
    Fatal {
        /// The underlying error message.
        reason: String,
    },

    /// Task execution failed but may succeed if retried.
    #[error("execution failed: {reason}")]
    Fail {
        /// The underlying error message.
        reason: String,
    },

    /// Task was cancelled cooperatively.
    #[error("context cancelled")]
    Canceled,

    /// Operation is not allowed in the current lifecycle state.
    #[error("invalid state: {op} not allowed while {status:?}")]
    InvalidState {
        /// Operation that was attempted.
        op: &'static str,
        /// Status observed when the operation was attempted.
        status: TaskStatus,
    },

    /// Parameters handed to the task do not match what it expects.
    #[error("argument mismatch: {reason}")]
    ArgumentMismatch {
        /// What was missing or malformed.
        reason: String,
    },

    /// No task with the given name is registered.
    #[error("no task named {name:?}")]
    NotFound {
        /// Requested task name.
        name: String,
    },

    /// Two mutually exclusive tasks are present at the same time.
    #[error("tasks {first:?} and {second:?} are mutually exclusive")]
    Conflict {
        /// Task that declared the exclusion.
        first: String,
        /// Task it excludes.
        second: String,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(reason: impl Into<String>) -> Self {
        TaskError::Fail {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`TaskError::Fatal`].
    pub fn fatal(reason: impl Into<String>) -> Self {
        TaskError::Fatal {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`TaskError::ArgumentMismatch`].
    pub fn argument_mismatch(reason: impl Into<String>) -> Self {
        TaskError::ArgumentMismatch {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskcore::TaskError;
    /// use std::time::Duration;
    ///
    /// let err = TaskError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "task_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
            TaskError::InvalidState { .. } => "task_invalid_state",
            TaskError::ArgumentMismatch { .. } => "task_argument_mismatch",
            TaskError::NotFound { .. } => "task_not_found",
            TaskError::Conflict { .. } => "task_conflict",
        }
    }

    /// Indicates whether the error type is safe to retry.
    ///
    /// Returns `true` for [`TaskError::Fail`] and [`TaskError::Timeout`], `false` otherwise.
    ///
    /// # Example
    /// ```
    /// use taskcore::TaskError;
    ///
    /// assert!(TaskError::fail("boom").is_retryable());
    /// assert!(!TaskError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Fail { .. } | TaskError::Timeout { .. })
    }
}

/// # Errors produced by [`AsyncWorker`](crate::AsyncWorker).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Operation is not allowed in the worker's current state.
    #[error("invalid worker state: {op} not allowed while {state:?}")]
    InvalidState {
        /// Operation that was attempted.
        op: &'static str,
        /// State observed when the operation was attempted.
        state: WorkerState,
    },

    /// The worker did not finish within its deadline.
    #[error("worker timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The worker was cancelled.
    #[error("worker cancelled")]
    Cancelled,

    /// The worker body returned an error.
    #[error("worker failed: {0}")]
    Failed(#[from] TaskError),

    /// The worker body panicked.
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::InvalidState { .. } => "worker_invalid_state",
            WorkerError::Timeout { .. } => "worker_timeout",
            WorkerError::Cancelled => "worker_cancelled",
            WorkerError::Failed(_) => "worker_failed",
            WorkerError::Panicked(_) => "worker_panicked",
        }
    }
}

/// # Errors produced by [`ThreadSafeQueue`](crate::ThreadSafeQueue).
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was destroyed; no more items are accepted.
    #[error("queue closed")]
    Closed,
}

impl QueueError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Closed => "queue_closed",
        }
    }
}

/// # Errors produced by [`MessageBus`](crate::MessageBus).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// The bus has been stopped; publishing is rejected.
    #[error("message bus stopped")]
    Stopped,

    /// A subscriber handler returned an error or panicked.
    ///
    /// Only ever logged by the dispatch threads; delivery to other subscribers continues.
    #[error("handler #{subscription} on topic {topic:?} failed: {reason}")]
    HandlerFailure {
        /// Topic the message was published on (`None` for global publishes).
        topic: Option<String>,
        /// Id of the failing subscription.
        subscription: u64,
        /// Error or panic message.
        reason: String,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::Stopped => "bus_stopped",
            BusError::HandlerFailure { .. } => "bus_handler_failure",
        }
    }
}

/// # Errors produced by the dependency resolver.
///
/// The lenient resolver never returns `CircularDependency`/`UnresolvedDependency`; it logs them
/// as warnings. Only
/// [`DependencyResolver::resolve_strict`](crate::resolver::DependencyResolver::resolve_strict)
/// raises them.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Reading a manifest or directory failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A manifest is not valid JSON or lacks required fields.
    #[error("invalid manifest {path}: {source}")]
    Manifest {
        /// Manifest path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The dependency graph contains a cycle.
    #[error("circular dependency: {cycle}")]
    CircularDependency {
        /// Units on the cycle, joined with ` -> `.
        cycle: String,
    },

    /// A unit depends on a name no unit provides.
    #[error("unit {unit:?} depends on unknown unit {missing:?}")]
    UnresolvedDependency {
        /// Dependent unit.
        unit: String,
        /// Dependency that was not found.
        missing: String,
    },
}

impl ResolverError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResolverError::Io { .. } => "resolver_io",
            ResolverError::Manifest { .. } => "resolver_manifest",
            ResolverError::CircularDependency { .. } => "circular_dependency",
            ResolverError::UnresolvedDependency { .. } => "unresolved_dependency",
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_labels_and_retryability() {
        assert_eq!(TaskError::fail("x").as_label(), "task_failed");
        assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
        assert!(TaskError::Timeout { timeout: Duration::from_millis(5) }.is_retryable());
        assert!(!TaskError::argument_mismatch("missing 'exposure'").is_retryable());
        assert!(!TaskError::Canceled.is_retryable());
    }

    #[test]
    fn test_worker_error_wraps_task_error() {
        let err: WorkerError = TaskError::fail("boom").into();
        assert_eq!(err.as_label(), "worker_failed");
        assert_eq!(err.to_string(), "worker failed: execution failed: boom");
    }

    #[test]
    fn test_invalid_state_message() {
        let err = TaskError::InvalidState {
            op: "run",
            status: TaskStatus::Completed,
        };
        assert_eq!(err.to_string(), "invalid state: run not allowed while Completed");
    }
}
