//! # taskcore
//!
//! **taskcore** is the concurrency and task-orchestration core of a device-control host:
//! tasks with an observable lifecycle, registries to hold them, an in-process message bus,
//! async workers with timeout and retry, delayed triggers, spinlocks and a dependency
//! resolver that decides in which order plugins start.
//!
//! ## Architecture
//! ```text
//!   <dir>/<unit>/package.json
//!              │
//!              ▼
//!   ┌────────────────────┐  load order   ┌──────────────────────────────┐
//!   │ DependencyResolver │ ────────────► │ TaskBuilder / SimpleTask /   │
//!   └────────────────────┘               │ ConditionalTask / DaemonTask │
//!                                        │ / PluginTask                 │
//!                                        └──────┬───────────────────────┘
//!                                               ▼
//!                          ┌──────────────────────────────────────────┐
//!                          │ TaskContainer (by name) / TaskStack      │
//!                          │ (ordered, mutual exclusion)              │
//!                          └──────┬──────────────────────────┬────────┘
//!                                 │ run()                    │ TaskEvent
//!                                 ▼                          ▼
//!             ┌───────────────────────────────┐   ┌──────────────────────────────┐
//!             │ AsyncWorker / AsyncWorkerMgr  │   │ MessageBus                   │
//!             │ async_retry (BackoffPolicy)   │   │ topic lanes: ThreadSafeQueue │
//!             └───────────────────────────────┘   │ dispatch threads             │
//!                                                 └──────────┬───────────────────┘
//!                                                            ▼
//!                                          typed handlers / Subscribe impls (LogWriter)
//! ```
//!
//! [`Trigger`] fires named callbacks now or after a delay, independent of the registries.
//! [`sync`] holds the spinlocks the registries and the worker manager are built on.
//!
//! ## Features
//! | Area            | Description                                                     | Key types                                        |
//! |-----------------|-----------------------------------------------------------------|--------------------------------------------------|
//! | **Tasks**       | Lifecycle `Pending → Running → Completed/Failed`, cancellation. | [`Task`], [`SimpleTask`], [`DaemonTask`]         |
//! | **Registries**  | Named registry with batch ops; ordered stack with exclusions.   | [`TaskContainer`], [`TaskStack`]                 |
//! | **Messaging**   | Typed pub/sub with priorities, per-topic ordering.              | [`MessageBus`], [`TaskEvent`]                    |
//! | **Workers**     | Futures with timeout, cancellation, callback, retry.            | [`AsyncWorker`], [`async_retry`]                 |
//! | **Scheduling**  | Named callbacks, fired now or after a delay.                    | [`Trigger`]                                      |
//! | **Ordering**    | Lenient and strict topological sort of units.                   | [`resolver::DependencyResolver`]                 |
//! | **Errors**      | Typed errors with stable labels.                                | [`TaskError`], [`WorkerError`], [`BusError`]     |
//! | **Config**      | Defaults for dispatch threads, timeouts and retry.              | [`Config`]                                       |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use taskcore::{Config, LogWriter, MessageBus, TaskBuilder, TaskContainer, TaskStatus};
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() {
//!     let cfg = Config::default();
//!     let bus = MessageBus::with_config(&cfg);
//!     taskcore::subscribers::attach(&bus, Arc::new(LogWriter::new()));
//!
//!     let container = TaskContainer::new();
//!     container.add_task(
//!         TaskBuilder::new("expose")
//!             .with_params(json!({"seconds": 2}))
//!             .with_timeout(Duration::from_secs(1))
//!             .with_bus(&bus)
//!             .build(|p, _ctx| async move { Ok(json!({"frames": p["seconds"]})) })
//!             .into_ref(),
//!     );
//!
//!     let task = container.get_task("expose").unwrap();
//!     assert_eq!(task.run().await, Ok(TaskStatus::Completed));
//!     assert_eq!(task.result(), Some(json!({"frames": 2})));
//!     bus.stop_all_processing_threads();
//! }
//! ```
mod config;
mod error;
mod events;
mod policies;
mod queue;
pub mod resolver;
pub mod subscribers;
pub mod sync;
mod tasks;
mod trigger;
mod worker;

// ---- Public re-exports ----

pub use config::Config;
pub use error::{BusError, QueueError, ResolverError, TaskError, WorkerError};
pub use events::{BusStats, MessageBus, SubscriptionId, TaskEvent, TaskEventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use queue::ThreadSafeQueue;
pub use resolver::{DependencyResolver, UnitManifest};
pub use subscribers::{LogWriter, Subscribe};
pub use sync::{SpinCell, Spinlock, TicketSpinlock, UnfairSpinlock};
pub use tasks::{
    ConditionalTask, DaemonTask, Executor, PluginTask, SimpleTask, Task, TaskBuilder,
    TaskContainer, TaskKind, TaskRef, TaskStack, TaskState, TaskStatus, TerminateHook, executor,
    run_once,
};
pub use trigger::{CallbackId, Trigger};
pub use worker::{
    AsyncWorker, AsyncWorkerManager, RetryPolicy, WorkerState, async_retry,
    async_retry_with_defaults,
};
