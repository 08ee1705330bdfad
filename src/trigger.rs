//! # Named-event callback registry.
//!
//! [`Trigger`] maps event names to ordered callback lists and fires them now, after a delay,
//! or on the blocking pool.
//!
//! ```text
//! register_callback("exposure_done", cb) ─► id
//!
//! trigger("exposure_done", &args)                  ─► cb1(&args), cb2(&args) ... (caller thread)
//! schedule_trigger("exposure_done", args, 500ms)   ─► tokio timer ─► trigger(...)
//!                                 └─ cancel_trigger("exposure_done") before it elapses ─► dropped
//! schedule_async_trigger("exposure_done", args)    ─► spawn_blocking ─► trigger(...)
//! ```
//!
//! ## Rules
//! - Callbacks fire in registration order.
//! - Firing works on a snapshot; callbacks may (un)register without deadlocking.
//! - A panicking callback is logged and the rest still run.
//! - Closures are not comparable, so unregistration takes the [`CallbackId`] returned at
//!   registration.
//! - `schedule_*` spawn onto the current tokio runtime.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::panic_message;

/// Identifier of a registered callback.
pub type CallbackId = u64;

type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct Scheduled {
    id: u64,
    token: CancellationToken,
}

struct Inner<A> {
    callbacks: RwLock<HashMap<String, Vec<(CallbackId, Callback<A>)>>>,
    pending: Mutex<HashMap<String, Vec<Scheduled>>>,
    next_id: AtomicU64,
}

/// Event-name → callbacks registry. Cloning shares the registry.
pub struct Trigger<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for Trigger<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Trigger<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events: Vec<String> = self.inner.callbacks.read().keys().cloned().collect();
        f.debug_struct("Trigger").field("events", &events).finish()
    }
}

impl<A> Default for Trigger<A>
where
    A: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Trigger<A>
where
    A: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                callbacks: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Appends `cb` to the callbacks of `event`.
    pub fn register_callback<F>(&self, event: impl Into<String>, cb: F) -> CallbackId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.inner
            .callbacks
            .write()
            .entry(event.into())
            .or_default()
            .push((id, Arc::new(cb)));
        id
    }

    /// Removes callback `id` from `event`. Returns `false` if it was not registered there.
    pub fn unregister_callback(&self, event: &str, id: CallbackId) -> bool {
        let mut map = self.inner.callbacks.write();
        let Some(list) = map.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(cid, _)| *cid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(event);
        }
        removed
    }

    /// Fires every callback of `event` on the calling thread.
    ///
    /// Returns the number of callbacks invoked; an unknown event is a no-op returning 0.
    pub fn trigger(&self, event: &str, args: &A) -> usize {
        let snapshot: Vec<Callback<A>> = match self.inner.callbacks.read().get(event) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };
        for cb in &snapshot {
            if let Err(p) = std::panic::catch_unwind(AssertUnwindSafe(|| cb(args))) {
                tracing::error!(event, panic = %panic_message(&*p), "trigger callback panicked");
            }
        }
        snapshot.len()
    }

    /// Fires `event` with `args` after `delay` unless cancelled first.
    ///
    /// The handle resolves to `Some(count)` once fired, `None` if cancelled.
    pub fn schedule_trigger(
        &self,
        event: impl Into<String>,
        args: A,
        delay: Duration,
    ) -> JoinHandle<Option<usize>> {
        let event = event.into();
        let id = self.next_id();
        let token = CancellationToken::new();
        self.inner
            .pending
            .lock()
            .entry(event.clone())
            .or_default()
            .push(Scheduled {
                id,
                token: token.clone(),
            });

        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(event = %event, "scheduled trigger cancelled");
                    None
                }
                _ = tokio::time::sleep(delay) => {
                    this.forget_scheduled(&event, id);
                    Some(this.trigger(&event, &args))
                }
            }
        })
    }

    /// Fires `event` now on the blocking pool.
    pub fn schedule_async_trigger(&self, event: impl Into<String>, args: A) -> JoinHandle<usize> {
        let event = event.into();
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.trigger(&event, &args))
    }

    fn forget_scheduled(&self, event: &str, id: u64) {
        let mut pending = self.inner.pending.lock();
        if let Some(list) = pending.get_mut(event) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                pending.remove(event);
            }
        }
    }

    /// Cancels the not-yet-fired schedules of `event`; returns how many were cancelled.
    pub fn cancel_trigger(&self, event: &str) -> usize {
        let cancelled = self.inner.pending.lock().remove(event).unwrap_or_default();
        cancelled.iter().for_each(|s| s.token.cancel());
        cancelled.len()
    }

    /// Cancels every pending schedule.
    pub fn cancel_all_triggers(&self) -> usize {
        let drained: Vec<Scheduled> = self
            .inner
            .pending
            .lock()
            .drain()
            .flat_map(|(_, list)| list)
            .collect();
        drained.iter().for_each(|s| s.token.cancel());
        drained.len()
    }

    /// Number of scheduled fires that have not started yet.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().values().map(Vec::len).sum()
    }

    /// Number of callbacks registered for `event`.
    pub fn callback_count(&self, event: &str) -> usize {
        self.inner.callbacks.read().get(event).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Log = Arc<Mutex<Vec<(u32, u32)>>>;

    fn recorder(trigger: &Trigger<u32>, event: &str, tag: u32, log: &Log) -> CallbackId {
        let log = Arc::clone(log);
        trigger.register_callback(event, move |a: &u32| log.lock().push((tag, *a)))
    }

    #[test]
    fn test_fires_in_registration_order() {
        let t = Trigger::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&t, "focus", 1, &log);
        let second = recorder(&t, "focus", 2, &log);
        recorder(&t, "focus", 3, &log);

        assert_eq!(t.trigger("focus", &7), 3);
        assert!(t.unregister_callback("focus", second));
        assert!(!t.unregister_callback("focus", second));
        assert_eq!(t.trigger("focus", &8), 2);

        assert_eq!(*log.lock(), vec![(1, 7), (2, 7), (3, 7), (1, 8), (3, 8)]);
        assert_eq!(t.trigger("unknown", &0), 0);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let t: Trigger<()> = Trigger::new();
        let hits = Arc::new(AtomicUsize::new(0));
        t.register_callback("e", |_| panic!("bad callback"));
        {
            let hits = Arc::clone(&hits);
            t.register_callback("e", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(t.trigger("e", &()), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_fire_and_cancel() {
        let t = Trigger::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&t, "tick", 1, &log);

        let fired = t.schedule_trigger("tick", 5, Duration::from_millis(100));
        let dropped = t.schedule_trigger("tock", 6, Duration::from_millis(100));
        assert_eq!(t.pending_count(), 2);
        assert_eq!(t.cancel_trigger("tock"), 1);

        assert_eq!(fired.await.unwrap(), Some(1));
        assert_eq!(dropped.await.unwrap(), None);
        assert_eq!(*log.lock(), vec![(1, 5)]);
        assert_eq!(t.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_triggers() {
        let t: Trigger<u32> = Trigger::new();
        let a = t.schedule_trigger("a", 1, Duration::from_secs(1));
        let b = t.schedule_trigger("b", 2, Duration::from_secs(2));
        assert_eq!(t.cancel_all_triggers(), 2);
        assert_eq!(a.await.unwrap(), None);
        assert_eq!(b.await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_trigger_runs_off_thread() {
        let t = Trigger::new();
        let caller = std::thread::current().id();
        let seen = Arc::new(Mutex::new(None));
        {
            let seen = Arc::clone(&seen);
            t.register_callback("bg", move |_: &()| {
                *seen.lock() = Some(std::thread::current().id());
            });
        }
        assert_eq!(t.schedule_async_trigger("bg", ()).await.unwrap(), 1);
        assert_eq!(t.callback_count("bg"), 1);
        assert_ne!(*seen.lock(), Some(caller));
    }
}
