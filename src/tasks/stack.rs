//! # Ordered task stack with mutual-exclusion rules.
//!
//! [`TaskStack`] keeps tasks in push order together with the last status it observed for each,
//! and a table of names that must not be present at the same time.
//!
//! Exclusion rules are directional: `register_mutually_exclusive_tasks("a", ["b"])` forbids
//! `b` next to `a`; register the reverse as well if both directions matter. Checking is a pure
//! query, conflicting tasks are never removed automatically.
//!
//! Locks are held per call and never across a task run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use parking_lot::RwLock;

use crate::error::TaskError;
use crate::tasks::task::{TaskRef, TaskStatus};

#[derive(Default)]
struct Inner {
    tasks: Vec<TaskRef>,
    status: Vec<TaskStatus>,
    names: Vec<String>,
    exclusive: BTreeMap<String, BTreeSet<String>>,
}

impl Inner {
    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn first_conflict(&self) -> Option<(String, String)> {
        self.conflicts().into_iter().next()
    }

    fn conflicts(&self) -> Vec<(String, String)> {
        let present = |n: &str| self.names.iter().any(|m| m == n);
        self.exclusive
            .iter()
            .filter(|(a, _)| present(a))
            .flat_map(|(a, others)| {
                others
                    .iter()
                    .filter(|b| present(b))
                    .map(move |b| (a.clone(), b.clone()))
            })
            .collect()
    }
}

/// Push-ordered task list with exclusion checks.
#[derive(Default)]
pub struct TaskStack {
    inner: RwLock<Inner>,
}

impl fmt::Debug for TaskStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TaskStack")
            .field("names", &inner.names)
            .field("status", &inner.status)
            .field("exclusive", &inner.exclusive)
            .finish()
    }
}

impl TaskStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `task`. Returns `false` if a task with the same name is already on the stack.
    pub fn add_task(&self, task: TaskRef) -> bool {
        let mut inner = self.inner.write();
        let name = task.name().to_owned();
        if inner.position(&name).is_some() {
            tracing::warn!(task = %name, "task already on the stack");
            return false;
        }
        inner.status.push(task.status());
        inner.names.push(name);
        inner.tasks.push(task);
        true
    }

    pub fn remove_task(&self, name: &str) -> Option<TaskRef> {
        let mut inner = self.inner.write();
        let idx = inner.position(name)?;
        inner.status.remove(idx);
        inner.names.remove(idx);
        Some(inner.tasks.remove(idx))
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.inner.read().position(name).is_some()
    }

    /// Status recorded when the task was pushed or last executed through the stack.
    pub fn get_task_status(&self, name: &str) -> Option<TaskStatus> {
        let inner = self.inner.read();
        inner.position(name).map(|i| inner.status[i])
    }

    pub fn task_names(&self) -> Vec<String> {
        self.inner.read().names.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().tasks.is_empty()
    }

    /// Forbids each of `others` from being on the stack together with `name`.
    pub fn register_mutually_exclusive_tasks<I, S>(&self, name: &str, others: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.inner.write();
        inner
            .exclusive
            .entry(name.to_owned())
            .or_default()
            .extend(others.into_iter().map(Into::into));
    }

    /// `true` if no registered exclusion is violated by the current names.
    pub fn check_mutually_exclusive_tasks(&self) -> bool {
        match self.inner.read().first_conflict() {
            Some((a, b)) => {
                tracing::debug!(first = %a, second = %b, "mutually exclusive tasks present");
                false
            }
            None => true,
        }
    }

    /// Every violated `(name, excluded)` pair, sorted by name.
    pub fn conflicts(&self) -> Vec<(String, String)> {
        self.inner.read().conflicts()
    }

    /// Runs the named task and records its resulting status.
    pub async fn execute_task(&self, name: &str) -> Result<TaskStatus, TaskError> {
        let task = {
            let inner = self.inner.read();
            let idx = inner
                .position(name)
                .ok_or_else(|| TaskError::NotFound { name: name.into() })?;
            inner.tasks[idx].clone()
        };
        let status = task.run().await?;
        self.record(name, task.status());
        Ok(status)
    }

    /// Runs every task in push order, stopping at the first task that refuses to run.
    ///
    /// Nothing runs while an exclusion is violated: the first conflict is returned as
    /// [`TaskError::Conflict`].
    pub async fn execute_all_tasks(&self) -> Result<Vec<TaskStatus>, TaskError> {
        let tasks = {
            let inner = self.inner.read();
            if let Some((first, second)) = inner.first_conflict() {
                tracing::warn!(%first, %second, "refusing to run conflicting tasks");
                return Err(TaskError::Conflict { first, second });
            }
            inner.tasks.clone()
        };

        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            let status = task.run().await?;
            self.record(task.name(), task.status());
            out.push(status);
        }
        Ok(out)
    }

    /// Tasks whose recorded status equals `status`, in push order.
    pub fn filter_by_status(&self, status: TaskStatus) -> Vec<TaskRef> {
        let inner = self.inner.read();
        inner
            .tasks
            .iter()
            .zip(&inner.status)
            .filter(|(_, s)| **s == status)
            .map(|(t, _)| t.clone())
            .collect()
    }

    fn record(&self, name: &str, status: TaskStatus) {
        let mut inner = self.inner.write();
        if let Some(idx) = inner.position(name) {
            inner.status[idx] = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{ConditionalTask, SimpleTask};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn task(name: &str) -> TaskRef {
        SimpleTask::new(name.to_owned(), json!({}), |_, _| async { Ok(json!("ok")) }).into_ref()
    }

    #[test]
    fn test_exclusion_follows_presence() {
        let stack = TaskStack::new();
        stack.register_mutually_exclusive_tasks("a", ["b"]);
        stack.add_task(task("a"));
        assert!(stack.check_mutually_exclusive_tasks());

        stack.add_task(task("b"));
        assert!(!stack.check_mutually_exclusive_tasks());
        assert_eq!(stack.conflicts(), vec![("a".to_string(), "b".to_string())]);

        assert!(stack.remove_task("a").is_some());
        assert!(stack.check_mutually_exclusive_tasks());
        stack.add_task(task("a"));
        assert!(stack.remove_task("b").is_some());
        assert!(stack.check_mutually_exclusive_tasks());
    }

    #[test]
    fn test_exclusion_is_directional() {
        let stack = TaskStack::new();
        stack.register_mutually_exclusive_tasks("b", Vec::<String>::new());
        stack.register_mutually_exclusive_tasks("c", ["x"]);
        stack.add_task(task("b"));
        stack.add_task(task("x"));
        assert!(stack.check_mutually_exclusive_tasks());
    }

    #[test]
    fn test_add_remove_bookkeeping() {
        let stack = TaskStack::new();
        assert!(stack.add_task(task("one")));
        assert!(!stack.add_task(task("one")));
        assert!(stack.add_task(task("two")));
        assert_eq!(stack.task_names(), vec!["one", "two"]);
        assert_eq!(stack.get_task_status("two"), Some(TaskStatus::Pending));
        assert_eq!(stack.get_task_status("nope"), None);
        assert!(stack.has_task("one"));
        assert!(stack.remove_task("nope").is_none());
        assert_eq!(stack.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_records_status() {
        let stack = TaskStack::new();
        stack.add_task(task("first"));
        stack.add_task(
            SimpleTask::new("broken", Value::Null, |_, _| async {
                Err(TaskError::fail("no camera"))
            })
            .into_ref(),
        );

        assert_eq!(stack.execute_task("first").await, Ok(TaskStatus::Completed));
        assert_eq!(stack.get_task_status("first"), Some(TaskStatus::Completed));
        assert_eq!(
            stack.execute_task("missing").await,
            Err(TaskError::NotFound {
                name: "missing".into()
            })
        );

        assert_eq!(stack.execute_task("broken").await, Ok(TaskStatus::Failed));
        assert_eq!(stack.filter_by_status(TaskStatus::Failed).len(), 1);
        assert_eq!(stack.filter_by_status(TaskStatus::Pending).len(), 0);
    }

    #[tokio::test]
    async fn test_execute_all_in_order() {
        let stack = TaskStack::new();
        stack.add_task(task("a"));
        let gated = ConditionalTask::new(
            "skip-me",
            json!({"on": false}),
            |p| p["on"] == json!(true),
            |_, _| async { Ok(json!(1)) },
        );
        stack.add_task(gated.into_ref());
        stack.add_task(task("c"));

        let statuses = stack.execute_all_tasks().await.unwrap();
        assert_eq!(statuses, vec![TaskStatus::Completed; 3]);
        let skipped = stack.filter_by_status(TaskStatus::Completed);
        assert_eq!(skipped[1].result(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_execute_all_refuses_conflicts() {
        let stack = TaskStack::new();
        let a = task("a");
        stack.add_task(Arc::clone(&a));
        stack.add_task(task("b"));
        stack.register_mutually_exclusive_tasks("a", ["b"]);

        assert_eq!(
            stack.execute_all_tasks().await,
            Err(TaskError::Conflict {
                first: "a".into(),
                second: "b".into()
            })
        );
        assert_eq!(a.status(), TaskStatus::Pending);
    }
}
