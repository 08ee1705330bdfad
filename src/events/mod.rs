//! Message bus and task lifecycle events.
//!
//! ## Contents
//! - [`MessageBus`] typed publish/subscribe over dispatch threads
//! - [`SubscriptionId`], [`BusStats`] handles and counters returned by the bus
//! - [`TaskEvent`], [`TaskEventKind`] lifecycle notifications published by tasks
//!
//! ## Quick reference
//! - **Publishers**: any code holding a bus clone; tasks attached with `with_bus` publish
//!   [`TaskEvent`]s on the topic equal to their name.
//! - **Consumers**: closures registered with `subscribe`/`global_subscribe`, e.g.
//!   [`LogWriter`](crate::subscribers::LogWriter).

mod bus;
mod event;
mod subscription;

pub use bus::{BusStats, MessageBus};
pub use event::{TaskEvent, TaskEventKind};
pub use subscription::SubscriptionId;
