//! # Task lifecycle events.
//!
//! Tasks attached to a [`MessageBus`](crate::MessageBus) publish a [`TaskEvent`] on every
//! status transition, on the topic equal to the task name. Subscribers interested in all tasks
//! use `global_subscribe::<TaskEvent>`.
//!
//! ## Ordering
//! Each event carries a process-wide monotonic `seq`. Within one task, events are published
//! from the executing context in transition order, so topic ordering on the bus keeps them in
//! order; `seq` restores order across tasks.
//!
//! ## Example
//! ```rust
//! use taskcore::{TaskEvent, TaskEventKind};
//!
//! let ev = TaskEvent::new(TaskEventKind::Failed, "expose")
//!     .with_reason("shutter stuck")
//!     .with_plugin("camera");
//!
//! assert_eq!(ev.kind, TaskEventKind::Failed);
//! assert_eq!(&*ev.task, "expose");
//! assert_eq!(ev.reason.as_deref(), Some("shutter stuck"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of task lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEventKind {
    /// Pending → Running.
    Started,
    /// Running → Completed.
    Completed,
    /// Conditional task completed without executing (condition false, not forced).
    Skipped,
    /// Running → Failed.
    ///
    /// Sets `reason` to the error message.
    Failed,
    /// A run exceeded its timeout; always followed by `Failed`.
    ///
    /// Sets `timeout_ms`.
    TimeoutHit,
    /// Pending/Running → Cancelled.
    Cancelled,
    /// A daemon was asked to stop and is finishing its current iteration.
    StopRequested,
}

impl TaskEventKind {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskEventKind::Started => "started",
            TaskEventKind::Completed => "completed",
            TaskEventKind::Skipped => "skipped",
            TaskEventKind::Failed => "failed",
            TaskEventKind::TimeoutHit => "timeout",
            TaskEventKind::Cancelled => "cancelled",
            TaskEventKind::StopRequested => "stop-requested",
        }
    }
}

/// Task lifecycle event with optional metadata.
#[derive(Clone, Debug)]
pub struct TaskEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: TaskEventKind,
    /// Name of the task.
    pub task: Arc<str>,
    /// Owning plugin, for plugin tasks.
    pub plugin: Option<Arc<str>>,
    /// Human-readable reason (error message, skip cause).
    pub reason: Option<Arc<str>>,
    /// Timeout in milliseconds (for `TimeoutHit`).
    pub timeout_ms: Option<u32>,
}

impl TaskEvent {
    /// Creates an event with the current timestamp and the next sequence number.
    pub fn new(kind: TaskEventKind, task: impl Into<Arc<str>>) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: task.into(),
            plugin: None,
            reason: None,
            timeout_ms: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the owning plugin name.
    #[inline]
    pub fn with_plugin(mut self, plugin: impl Into<Arc<str>>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// True for events after which the task will not transition again.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            TaskEventKind::Completed
                | TaskEventKind::Skipped
                | TaskEventKind::Failed
                | TaskEventKind::Cancelled
        )
    }
}
