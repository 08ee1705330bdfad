//! # Tasks and task registries.
//!
//! - [`Task`] - trait with the shared lifecycle; [`TaskRef`] is the shared handle
//! - [`SimpleTask`], [`ConditionalTask`], [`DaemonTask`], [`PluginTask`] - execution variants
//! - [`TaskBuilder`] - common options (timeout, required params, failure hook, event bus)
//! - [`TaskContainer`] - name-keyed registry with batch operations
//! - [`TaskStack`] - ordered registry with mutual-exclusion rules

mod builder;
mod conditional;
mod container;
mod daemon;
mod plugin;
mod runner;
mod simple;
mod stack;
mod state;
mod task;

pub use builder::TaskBuilder;
pub use conditional::ConditionalTask;
pub use container::TaskContainer;
pub use daemon::DaemonTask;
pub use plugin::PluginTask;
pub use runner::{Executor, executor, run_once};
pub use simple::SimpleTask;
pub use stack::TaskStack;
pub use state::{TaskState, TerminateHook};
pub use task::{Task, TaskKind, TaskRef, TaskStatus};
