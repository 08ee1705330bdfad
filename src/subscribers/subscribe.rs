//! # Task event subscriber trait.
//!
//! [`Subscribe`] is the extension point for reacting to [`TaskEvent`]s. Implementations are
//! attached to a [`MessageBus`] as global `TaskEvent` handlers with [`attach`], so they observe
//! every task that publishes on that bus.
//!
//! ## Rules
//! - `on_event` runs on a bus dispatch thread, never in the publisher's context.
//! - Events of one task arrive in publish order (one task = one topic = one lane).
//! - A returned error or a panic is logged by the bus; the subscriber stays attached.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use taskcore::subscribers::{Subscribe, attach};
//! use taskcore::{MessageBus, TaskEvent, TaskEventKind};
//!
//! #[derive(Default)]
//! struct FailureCounter(AtomicUsize);
//!
//! impl Subscribe for FailureCounter {
//!     fn on_event(&self, ev: &TaskEvent) -> anyhow::Result<()> {
//!         if ev.kind == TaskEventKind::Failed {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &'static str { "failure-counter" }
//! }
//!
//! let bus = MessageBus::new(1);
//! let counter = Arc::new(FailureCounter::default());
//! attach(&bus, Arc::clone(&counter));
//!
//! bus.publish("expose", TaskEvent::new(TaskEventKind::Failed, "expose")).unwrap();
//! bus.stop_all_processing_threads();
//! assert_eq!(counter.0.load(Ordering::Relaxed), 1);
//! ```

use std::sync::Arc;

use crate::events::{MessageBus, SubscriptionId, TaskEvent};

/// Observer of task lifecycle events.
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    fn on_event(&self, event: &TaskEvent) -> anyhow::Result<()>;

    /// Name used in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Bus priority; higher runs before other handlers of the same event. Default: 0.
    fn priority(&self) -> i32 {
        0
    }
}

/// Registers `subscriber` for every [`TaskEvent`] published on `bus`.
pub fn attach<S: Subscribe>(bus: &MessageBus, subscriber: Arc<S>) -> SubscriptionId {
    let priority = subscriber.priority();
    tracing::debug!(subscriber = subscriber.name(), priority, "attaching task event subscriber");
    bus.global_subscribe(move |ev: &TaskEvent| subscriber.on_event(ev), priority)
}
