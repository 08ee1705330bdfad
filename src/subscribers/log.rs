//! # LogWriter: task events as log lines.
//!
//! A built-in [`Subscribe`] implementation that renders every [`TaskEvent`] through `tracing`.
//! Failures log at `warn`, everything else at `info`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  taskcore::subscribers::log: [started] task="expose" plugin=Some("camera")
//! WARN  taskcore::subscribers::log: [failed] task="expose" reason="shutter stuck"
//! WARN  taskcore::subscribers::log: [timeout] task="download" timeout_ms=5000
//! INFO  taskcore::subscribers::log: [skipped] task="cool-down" reason="condition false"
//! INFO  taskcore::subscribers::log: [completed] task="focus"
//! ```

use crate::events::{TaskEvent, TaskEventKind};
use crate::subscribers::Subscribe;

/// Task event writer subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Subscribe for LogWriter {
    fn on_event(&self, e: &TaskEvent) -> anyhow::Result<()> {
        let label = e.kind.as_label();
        let task = &*e.task;
        match e.kind {
            TaskEventKind::Failed => {
                tracing::warn!(seq = e.seq, "[{label}] task={task:?} reason={:?}", e.reason);
            }
            TaskEventKind::TimeoutHit => {
                let timeout_ms = e.timeout_ms;
                tracing::warn!(seq = e.seq, "[{label}] task={task:?} timeout_ms={timeout_ms:?}");
            }
            TaskEventKind::Started => {
                tracing::info!(seq = e.seq, "[{label}] task={task:?} plugin={:?}", e.plugin);
            }
            TaskEventKind::Skipped | TaskEventKind::Cancelled | TaskEventKind::StopRequested => {
                tracing::info!(seq = e.seq, "[{label}] task={task:?} reason={:?}", e.reason);
            }
            TaskEventKind::Completed => {
                tracing::info!(seq = e.seq, "[{label}] task={task:?}");
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MessageBus;
    use crate::subscribers::attach;
    use std::sync::Arc;

    #[test]
    fn test_log_writer_accepts_every_kind() {
        let bus = MessageBus::new(1);
        attach(&bus, Arc::new(LogWriter::new()));
        for kind in [
            TaskEventKind::Started,
            TaskEventKind::Completed,
            TaskEventKind::Skipped,
            TaskEventKind::Failed,
            TaskEventKind::TimeoutHit,
            TaskEventKind::Cancelled,
            TaskEventKind::StopRequested,
        ] {
            assert_eq!(bus.publish("t", TaskEvent::new(kind, "t")).unwrap(), 1);
        }
        bus.stop_all_processing_threads();
        let stats = bus.stats();
        assert_eq!(stats.delivered, 7);
        assert_eq!(stats.failed, 0);
    }
}
