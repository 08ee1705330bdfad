//! # Task event subscribers.
//!
//! [`Subscribe`] implementations observe [`TaskEvent`](crate::TaskEvent)s published on a
//! [`MessageBus`](crate::MessageBus).
//!
//! ```text
//!   Task ── publish(name, TaskEvent) ──► MessageBus ──► global TaskEvent handlers
//!                                                          │
//!                                                ┌─────────┼─────────┐
//!                                                ▼         ▼         ▼
//!                                            LogWriter   Metrics   Custom ...
//! ```

mod log;
mod subscribe;

pub use log::LogWriter;
pub use subscribe::{Subscribe, attach};
