//! # Thread-safe task registry.
//!
//! [`TaskContainer`] maps unique names to [`TaskRef`] handles and remembers insertion order.
//!
//! ## Rules
//! - One reader-writer lock guards the whole container; every call holds it for its duration
//!   only, and batch calls take it once for the whole batch.
//! - The container stores handles: a task removed while running stays valid for its runner.
//! - Queries that return several tasks follow insertion order (or the order set by
//!   [`sort_tasks`](TaskContainer::sort_tasks)).
//! - Param edits go through the task's own lock, so readers of a task never see a torn value.
//!
//! ## Example
//! ```rust
//! use serde_json::{Value, json};
//! use taskcore::{SimpleTask, TaskContainer, TaskStatus};
//!
//! let container = TaskContainer::new();
//! let t1 = SimpleTask::new("t1", json!({}), |_, _| async { Ok(Value::Null) });
//! container.add_task(t1.into_ref());
//! assert_eq!(container.get_task_count(), 1);
//!
//! container.add_or_update_task_params("t1", json!({"gain": 4}));
//! assert_eq!(container.get_task_params("t1"), Some(json!({"gain": 4})));
//!
//! container.batch_remove_tasks(["t1"]);
//! assert_eq!(container.get_task_count(), 0);
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde_json::Value;

use crate::tasks::task::{TaskRef, TaskStatus};

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, TaskRef>,
    order: Vec<String>,
}

impl Inner {
    fn insert(&mut self, task: TaskRef) -> bool {
        let name = task.name().to_owned();
        if self.tasks.contains_key(&name) {
            tracing::warn!(task = %name, "task name already registered");
            return false;
        }
        self.order.push(name.clone());
        self.tasks.insert(name, task);
        true
    }

    fn remove(&mut self, name: &str) -> Option<TaskRef> {
        let task = self.tasks.remove(name)?;
        self.order.retain(|n| n != name);
        Some(task)
    }

    fn ordered(&self) -> impl Iterator<Item = &TaskRef> {
        self.order.iter().filter_map(|n| self.tasks.get(n))
    }
}

/// Name-keyed, insertion-ordered task registry.
#[derive(Default)]
pub struct TaskContainer {
    inner: RwLock<Inner>,
}

impl fmt::Debug for TaskContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContainer")
            .field("tasks", &self.inner.read().order)
            .finish()
    }
}

impl TaskContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `task`. Returns `false` (and keeps the existing one) if the name is taken.
    pub fn add_task(&self, task: TaskRef) -> bool {
        self.inner.write().insert(task)
    }

    /// Unregisters `name` and returns its handle.
    pub fn remove_task(&self, name: &str) -> Option<TaskRef> {
        self.inner.write().remove(name)
    }

    pub fn get_task(&self, name: &str) -> Option<TaskRef> {
        self.inner.read().tasks.get(name).cloned()
    }

    pub fn get_task_count(&self) -> usize {
        self.inner.read().tasks.len()
    }

    pub fn clear_tasks(&self) {
        let mut inner = self.inner.write();
        inner.tasks.clear();
        inner.order.clear();
    }

    /// Up to `count` tasks with `status`, in container order.
    pub fn find_tasks(&self, count: usize, status: TaskStatus) -> Vec<TaskRef> {
        self.inner
            .read()
            .ordered()
            .filter(|t| t.status() == status)
            .take(count)
            .cloned()
            .collect()
    }

    /// Registers every task under one lock; duplicates are skipped. Returns how many were added.
    pub fn batch_add_tasks(&self, tasks: impl IntoIterator<Item = TaskRef>) -> usize {
        let mut inner = self.inner.write();
        tasks.into_iter().filter(|t| inner.insert(t.clone())).count()
    }

    /// Unregisters every named task under one lock. Returns how many were removed.
    pub fn batch_remove_tasks<I, S>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = self.inner.write();
        names
            .into_iter()
            .filter(|n| inner.remove(n.as_ref()).is_some())
            .count()
    }

    /// Calls `f` on every task, in order, while holding the container's write lock.
    pub fn batch_modify_tasks<F>(&self, mut f: F)
    where
        F: FnMut(&TaskRef),
    {
        let inner = self.inner.write();
        inner.ordered().for_each(|t| f(t));
    }

    /// Merges `params` into the task's params when both are objects; replaces them otherwise.
    ///
    /// Returns `false` if there is no such task.
    pub fn add_or_update_task_params(&self, name: &str, params: Value) -> bool {
        let inner = self.inner.write();
        let Some(task) = inner.tasks.get(name) else {
            return false;
        };
        task.state().update_params(|current| match (current, params) {
            (Value::Object(cur), Value::Object(new)) => cur.extend(new),
            (current, new) => *current = new,
        });
        true
    }

    /// Inserts `params` at `position` in the task's params, treated as an array.
    ///
    /// A `null` params becomes `[]`, any other non-array value becomes a one-element array.
    /// `position` is clamped to the array length. Returns `false` if there is no such task.
    pub fn insert_task_params(&self, name: &str, params: Value, position: usize) -> bool {
        let inner = self.inner.write();
        let Some(task) = inner.tasks.get(name) else {
            return false;
        };
        task.state().update_params(|current| {
            let mut items = match current.take() {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => vec![other],
            };
            items.insert(position.min(items.len()), params);
            *current = Value::Array(items);
        });
        true
    }

    /// Copy of the named task's params.
    pub fn get_task_params(&self, name: &str) -> Option<Value> {
        self.inner.read().tasks.get(name).map(|t| t.params())
    }

    /// Every task, in container order.
    pub fn get_all_tasks(&self) -> Vec<TaskRef> {
        self.inner.read().ordered().cloned().collect()
    }

    pub fn task_names(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Tasks matching `pred`, in container order.
    pub fn filter_tasks<P>(&self, mut pred: P) -> Vec<TaskRef>
    where
        P: FnMut(&TaskRef) -> bool,
    {
        self.inner
            .read()
            .ordered()
            .filter(|t| pred(t))
            .cloned()
            .collect()
    }

    /// Stable reorder of the container order.
    pub fn sort_tasks<F>(&self, mut cmp: F)
    where
        F: FnMut(&TaskRef, &TaskRef) -> Ordering,
    {
        let mut inner = self.inner.write();
        let mut tasks: Vec<TaskRef> = inner.ordered().cloned().collect();
        tasks.sort_by(|a, b| cmp(a, b));
        inner.order = tasks.iter().map(|t| t.name().to_owned()).collect();
    }

    /// Tasks owned by `plugin`, in container order.
    pub fn tasks_by_plugin(&self, plugin: &str) -> Vec<TaskRef> {
        self.filter_tasks(|t| t.plugin_name() == Some(plugin))
    }
}
