//! # Typed publish/subscribe bus.
//!
//! [`MessageBus`] delivers messages of any `'static` type to handlers registered for a topic or
//! globally. Delivery happens on dedicated dispatch threads, each draining its own
//! [`ThreadSafeQueue`].
//!
//! ## Architecture
//! ```text
//! publish("cam", msg) ─► registry snapshot ─► Envelope ─► lane[hash("cam") % N]
//!                       (topic + global,                     │
//!                        priority order)                     ▼
//!                                              dispatch thread i ─► h1(&msg), h2(&msg) ...
//!                                                          error/panic ─► logged, counted
//! ```
//!
//! ## Rules
//! - **Typed**: handlers are keyed by message `TypeId`; a `u32` handler never sees a `String`.
//! - **Order**: handlers run by descending priority; ties run in registration order, whether
//!   topic-scoped or global.
//! - **Snapshot**: the handler list is fixed at publish time. Subscribing or unsubscribing later
//!   does not affect messages already queued.
//! - **Per-topic FIFO**: one topic always maps to the same lane, so messages from one publisher
//!   on one topic are delivered in publish order.
//! - **Isolation**: a handler returning `Err` or panicking is logged as
//!   [`BusError::HandlerFailure`]; the remaining handlers still run.
//! - **Shutdown**: [`stop_all_processing_threads`](MessageBus::stop_all_processing_threads)
//!   rejects new publishes, lets the lanes drain and joins the threads. Dropping the last handle
//!   does the same.
//!
//! A handler that captures a `MessageBus` clone keeps the bus alive; stop such buses explicitly.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use taskcore::MessageBus;
//!
//! let bus = MessageBus::new(1);
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! bus.subscribe("temperature", move |c: &f64| {
//!     sink.lock().unwrap().push(*c);
//!     Ok(())
//! }, 0);
//!
//! assert_eq!(bus.publish("temperature", -10.5_f64).unwrap(), 1);
//! bus.stop_all_processing_threads();
//! assert_eq!(*seen.lock().unwrap(), vec![-10.5]);
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{BuildHasher, RandomState};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};

use super::subscription::{ErasedHandler, Registry, Subscription, SubscriptionId};
use crate::config::Config;
use crate::error::{BusError, panic_message};
use crate::queue::ThreadSafeQueue;

/// Delivery counters, see [`MessageBus::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Messages accepted by `publish`/`publish_global`.
    pub published: u64,
    /// Successful handler invocations.
    pub delivered: u64,
    /// Handler invocations that returned an error or panicked.
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

struct Envelope {
    topic: Option<Arc<str>>,
    payload: Box<dyn Any + Send + Sync>,
    handlers: Vec<Subscription>,
}

impl Envelope {
    fn deliver(self, counters: &Counters) {
        for sub in &self.handlers {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                (sub.handler)(self.payload.as_ref())
            }));
            let reason = match outcome {
                Ok(Ok(())) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Ok(Err(e)) => format!("{e:#}"),
                Err(p) => format!("panicked: {}", panic_message(&*p)),
            };
            counters.failed.fetch_add(1, Ordering::Relaxed);
            let err = BusError::HandlerFailure {
                topic: self.topic.as_deref().map(str::to_owned),
                subscription: sub.id,
                reason,
            };
            tracing::warn!(label = err.as_label(), error = %err, "subscriber handler failed");
        }
    }
}

struct Shared {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
    lanes: Vec<Arc<ThreadSafeQueue<Envelope>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    counters: Arc<Counters>,
    hasher: RandomState,
}

impl Shared {
    fn lane_for(&self, topic: Option<&str>) -> &ThreadSafeQueue<Envelope> {
        let idx = match topic {
            Some(t) if self.lanes.len() > 1 => {
                (self.hasher.hash_one(t) % self.lanes.len() as u64) as usize
            }
            _ => 0,
        };
        &self.lanes[idx]
    }

    fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.lanes.iter().for_each(|l| l.destroy());

        let me = thread::current().id();
        let handles: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        for h in handles {
            if h.thread().id() == me {
                continue;
            }
            if h.join().is_err() {
                tracing::error!("bus dispatch thread panicked");
            }
        }
        tracing::debug!(lanes = self.lanes.len(), "message bus stopped");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(lane: usize, queue: Arc<ThreadSafeQueue<Envelope>>, counters: Arc<Counters>) {
    tracing::trace!(lane, "dispatch thread started");
    while let Some(envelope) = queue.take() {
        envelope.deliver(&counters);
    }
    tracing::trace!(lane, "dispatch thread exiting");
}

/// In-process typed publish/subscribe bus.
///
/// Cheap to clone; all clones share subscribers and dispatch threads.
#[derive(Clone)]
pub struct MessageBus {
    shared: Arc<Shared>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(1)
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("lanes", &self.shared.lanes.len())
            .field("subscribers", &self.shared.registry.read().len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl MessageBus {
    /// Starts a bus with `dispatch_threads` delivery threads (at least one).
    pub fn new(dispatch_threads: usize) -> Self {
        let n = dispatch_threads.max(1);
        let counters = Arc::new(Counters::default());
        let lanes: Vec<Arc<ThreadSafeQueue<Envelope>>> =
            (0..n).map(|_| Arc::new(ThreadSafeQueue::new())).collect();
        let threads = lanes
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let q = Arc::clone(q);
                let counters = Arc::clone(&counters);
                thread::spawn(move || dispatch_loop(i, q, counters))
            })
            .collect();

        Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(Registry::default()),
                next_id: AtomicU64::new(1),
                lanes,
                threads: Mutex::new(threads),
                running: AtomicBool::new(true),
                counters,
                hasher: RandomState::new(),
            }),
        }
    }

    /// Starts a bus sized by [`Config::dispatch_threads`].
    pub fn with_config(config: &Config) -> Self {
        Self::new(config.dispatch_threads())
    }

    fn register<M, F>(&self, topic: Option<String>, handler: F, priority: i32) -> SubscriptionId
    where
        M: Any + Send + Sync,
        F: Fn(&M) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: ErasedHandler =
            Arc::new(
                move |payload: &(dyn Any + Send + Sync)| match payload.downcast_ref::<M>() {
                    Some(msg) => handler(msg),
                    None => Err(anyhow::anyhow!("payload is not a {}", type_name::<M>())),
                },
            );
        tracing::trace!(id, topic = ?topic, message = type_name::<M>(), priority, "subscribed");
        self.shared.registry.write().insert(
            TypeId::of::<M>(),
            topic,
            Subscription {
                id,
                priority,
                handler,
            },
        );
        id
    }

    /// Subscribes `handler` to messages of type `M` on `topic`.
    ///
    /// Higher `priority` runs first.
    pub fn subscribe<M, F>(
        &self,
        topic: impl Into<String>,
        handler: F,
        priority: i32,
    ) -> SubscriptionId
    where
        M: Any + Send + Sync,
        F: Fn(&M) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(Some(topic.into()), handler, priority)
    }

    /// Subscribes `handler` to messages of type `M` on every topic, including global publishes.
    pub fn global_subscribe<M, F>(&self, handler: F, priority: i32) -> SubscriptionId
    where
        M: Any + Send + Sync,
        F: Fn(&M) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(None, handler, priority)
    }

    /// Removes subscription `id` for type `M` on `topic`.
    pub fn unsubscribe<M: Any>(&self, topic: &str, id: SubscriptionId) -> bool {
        self.shared
            .registry
            .write()
            .remove(TypeId::of::<M>(), Some(topic), id)
    }

    /// Removes global subscription `id` for type `M`.
    pub fn unsubscribe_global<M: Any>(&self, id: SubscriptionId) -> bool {
        self.shared
            .registry
            .write()
            .remove(TypeId::of::<M>(), None, id)
    }

    /// Removes every topic-scoped subscription on `topic`; returns how many were removed.
    pub fn unsubscribe_all(&self, topic: &str) -> usize {
        self.shared.registry.write().remove_topic(topic)
    }

    /// Removes every subscription, topic-scoped and global.
    pub fn clear_all_subscribers(&self) {
        self.shared.registry.write().clear();
    }

    fn enqueue<M>(&self, topic: Option<&str>, message: M) -> Result<usize, BusError>
    where
        M: Any + Send + Sync,
    {
        if !self.is_running() {
            return Err(BusError::Stopped);
        }
        let handlers = self
            .shared
            .registry
            .read()
            .matching(TypeId::of::<M>(), topic);
        self.shared
            .counters
            .published
            .fetch_add(1, Ordering::Relaxed);

        let n = handlers.len();
        if n == 0 {
            tracing::trace!(topic = ?topic, message = type_name::<M>(), "no subscribers");
            return Ok(0);
        }
        self.shared
            .lane_for(topic)
            .put(Envelope {
                topic: topic.map(Arc::from),
                payload: Box::new(message),
                handlers,
            })
            .map_err(|_| BusError::Stopped)?;
        Ok(n)
    }

    /// Queues `message` for the topic and global subscribers of its type.
    ///
    /// Returns the number of handlers that will receive it. Never waits on handlers.
    pub fn publish<M>(&self, topic: &str, message: M) -> Result<usize, BusError>
    where
        M: Any + Send + Sync,
    {
        self.enqueue(Some(topic), message)
    }

    /// Queues `message` for the global subscribers of its type only.
    pub fn publish_global<M>(&self, message: M) -> Result<usize, BusError>
    where
        M: Any + Send + Sync,
    {
        self.enqueue(None, message)
    }

    /// Number of topic-scoped subscriptions on `topic`, all message types.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared.registry.read().topic_count(topic)
    }

    /// True if `topic` has at least one topic-scoped subscription.
    pub fn has_subscriber(&self, topic: &str) -> bool {
        self.subscriber_count(topic) > 0
    }

    /// Topics with at least one subscription, sorted.
    pub fn active_topics(&self) -> Vec<String> {
        self.shared.registry.read().topics()
    }

    /// Delivery counters so far.
    pub fn stats(&self) -> BusStats {
        let c = &self.shared.counters;
        BusStats {
            published: c.published.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// False once the bus has been stopped.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of dispatch threads.
    pub fn dispatch_threads(&self) -> usize {
        self.shared.lanes.len()
    }

    /// Rejects further publishes, delivers everything already queued and joins the dispatch
    /// threads. Idempotent.
    ///
    /// Called from inside a handler, it skips joining the calling thread.
    pub fn stop_all_processing_threads(&self) {
        self.shared.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn collect<M: Clone + Send + Sync + 'static>(
        bus: &MessageBus,
        topic: Option<&str>,
        tag: &'static str,
        priority: i32,
        out: &Arc<Mutex<Vec<(&'static str, M)>>>,
    ) -> SubscriptionId {
        let out = Arc::clone(out);
        let h = move |m: &M| -> anyhow::Result<()> {
            out.lock().push((tag, m.clone()));
            Ok(())
        };
        match topic {
            Some(t) => bus.subscribe(t, h, priority),
            None => bus.global_subscribe(h, priority),
        }
    }

    #[test]
    fn test_priority_and_registration_order() {
        let bus = MessageBus::new(1);
        let out = Arc::new(Mutex::new(Vec::new()));
        collect::<u32>(&bus, Some("cam"), "low", -1, &out);
        collect::<u32>(&bus, None, "global-high", 10, &out);
        collect::<u32>(&bus, Some("cam"), "mid-a", 5, &out);
        collect::<u32>(&bus, None, "global-mid", 5, &out);
        collect::<u32>(&bus, Some("cam"), "mid-b", 5, &out);

        assert_eq!(bus.publish("cam", 1u32).unwrap(), 5);
        bus.stop_all_processing_threads();

        let tags: Vec<_> = out.lock().iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, vec!["global-high", "mid-a", "global-mid", "mid-b", "low"]);
    }

    #[test]
    fn test_messages_are_routed_by_type() {
        let bus = MessageBus::new(2);
        let ints = Arc::new(Mutex::new(Vec::new()));
        let strings = Arc::new(Mutex::new(Vec::new()));
        collect::<u32>(&bus, Some("t"), "int", 0, &ints);
        collect::<String>(&bus, Some("t"), "str", 0, &strings);

        assert_eq!(bus.publish("t", 7u32).unwrap(), 1);
        assert_eq!(bus.publish("t", "seven".to_string()).unwrap(), 1);
        assert_eq!(bus.publish("t", 7i64).unwrap(), 0);
        bus.stop_all_processing_threads();

        assert_eq!(*ints.lock(), vec![("int", 7)]);
        assert_eq!(*strings.lock(), vec![("str", "seven".to_string())]);
    }

    #[test]
    fn test_failing_handler_does_not_block_others() {
        let bus = MessageBus::new(1);
        let out = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("t", |_: &u8| anyhow::bail!("refused"), 9);
        bus.subscribe("t", |_: &u8| -> anyhow::Result<()> { panic!("boom") }, 8);
        collect::<u8>(&bus, Some("t"), "ok", 0, &out);

        bus.publish("t", 3u8).unwrap();
        bus.stop_all_processing_threads();

        assert_eq!(*out.lock(), vec![("ok", 3)]);
        assert_eq!(
            bus.stats(),
            BusStats {
                published: 1,
                delivered: 1,
                failed: 2
            }
        );
    }

    #[test]
    fn test_per_topic_order_across_lanes() {
        let bus = MessageBus::new(4);
        let (tx, rx) = mpsc::channel();
        for topic in ["a", "b", "c"] {
            let tx = tx.clone();
            bus.subscribe(
                topic,
                move |n: &u32| {
                    tx.send((topic, *n))?;
                    Ok(())
                },
                0,
            );
        }
        drop(tx);

        for n in 0..200u32 {
            for topic in ["a", "b", "c"] {
                bus.publish(topic, n).unwrap();
            }
        }
        drop(bus);

        let mut per_topic: std::collections::HashMap<&str, Vec<u32>> = Default::default();
        for (topic, n) in rx {
            per_topic.entry(topic).or_default().push(n);
        }
        for topic in ["a", "b", "c"] {
            assert_eq!(per_topic[topic], (0..200).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_unsubscribe_and_topic_queries() {
        let bus = MessageBus::default();
        let out = Arc::new(Mutex::new(Vec::<(&str, u8)>::new()));
        let a = collect::<u8>(&bus, Some("x"), "a", 0, &out);
        collect::<u8>(&bus, Some("x"), "b", 0, &out);
        collect::<u8>(&bus, Some("y"), "c", 0, &out);
        let g = collect::<u8>(&bus, None, "g", 0, &out);

        assert_eq!(bus.subscriber_count("x"), 2);
        assert_eq!(bus.active_topics(), vec!["x".to_string(), "y".to_string()]);
        assert!(bus.unsubscribe::<u8>("x", a));
        assert!(!bus.unsubscribe::<u16>("x", a));
        assert!(bus.unsubscribe_global::<u8>(g));
        assert_eq!(bus.unsubscribe_all("y"), 1);
        assert!(!bus.has_subscriber("y"));

        assert_eq!(bus.publish("x", 1u8).unwrap(), 1);
        bus.clear_all_subscribers();
        assert_eq!(bus.publish("x", 2u8).unwrap(), 0);
        bus.stop_all_processing_threads();
        assert_eq!(*out.lock(), vec![("b", 1)]);
    }

    #[test]
    fn test_global_publish_and_stop() {
        let bus = MessageBus::new(2);
        let out = Arc::new(Mutex::new(Vec::new()));
        collect::<&'static str>(&bus, Some("t"), "topic", 0, &out);
        collect::<&'static str>(&bus, None, "global", 0, &out);

        assert_eq!(bus.publish_global("hello").unwrap(), 1);
        bus.stop_all_processing_threads();
        bus.stop_all_processing_threads();

        assert!(!bus.is_running());
        assert!(matches!(bus.publish("t", "late"), Err(BusError::Stopped)));
        assert_eq!(*out.lock(), vec![("global", "hello")]);
    }
}
