//! # Blocking multi-producer/multi-consumer queue.
//!
//! [`ThreadSafeQueue`] is an unbounded FIFO guarded by one mutex and one condition variable.
//! It backs the [`MessageBus`](crate::MessageBus) dispatch threads and can be used directly
//! as a work queue between OS threads.
//!
//! ## Lifecycle
//! ```text
//! open ── put/take/wait_for ──► destroy() ── take drains the rest ──► None forever
//!                                    └──── put → Err(QueueError::Closed)
//! ```
//!
//! ## Rules
//! - `put` never blocks (the queue is unbounded).
//! - `take`/`wait_for`/`front`/`back` block; they return `None` only once the queue is destroyed
//!   **and** empty. Callers use that as their loop-termination signal.
//! - `len`/`is_empty` are snapshots; they never wait on anything but the short internal lock.
//! - Reordering (`sort_by`, `retain`, `extract_if`) happens under the same lock as `take`.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::QueueError;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded blocking FIFO queue.
pub struct ThreadSafeQueue<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
}

impl<T> Default for ThreadSafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ThreadSafeQueue<T> {
    /// Creates an empty, open queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Appends `value` and wakes parked waiters.
    ///
    /// Returns [`QueueError::Closed`] after [`destroy`](Self::destroy).
    pub fn put(&self, value: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        inner.items.push_back(value);
        drop(inner);
        // Predicate waiters and plain takers share one condvar.
        self.cond.notify_all();
        Ok(())
    }

    /// Appends every item of `values` under one lock acquisition.
    pub fn put_all(&self, values: impl IntoIterator<Item = T>) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        let before = inner.items.len();
        inner.items.extend(values);
        let added = inner.items.len() - before;
        drop(inner);
        self.cond.notify_all();
        Ok(added)
    }

    /// Blocks until an item is available and removes it.
    ///
    /// Returns `None` once the queue is destroyed and drained.
    pub fn take(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(v) = inner.items.pop_front() {
                return Some(v);
            }
            if inner.closed {
                return None;
            }
            self.cond.wait(&mut inner);
        }
    }

    /// Like [`take`](Self::take) but gives up after `timeout`.
    ///
    /// A timeout past the clock's range waits like `take`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.take();
        };
        let mut inner = self.inner.lock();
        loop {
            if let Some(v) = inner.items.pop_front() {
                return Some(v);
            }
            if inner.closed {
                return None;
            }
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                return inner.items.pop_front();
            }
        }
    }

    /// Removes the front item if there is one; never blocks.
    pub fn try_take(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Blocks until `pred` holds for the current contents, then removes the front item.
    ///
    /// After destroy the predicate is no longer awaited: remaining items are drained and
    /// `None` is returned once empty.
    pub fn wait_for<P>(&self, mut pred: P) -> Option<T>
    where
        P: FnMut(&VecDeque<T>) -> bool,
    {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return inner.items.pop_front();
            }
            if pred(&inner.items) {
                if let Some(v) = inner.items.pop_front() {
                    return Some(v);
                }
            }
            self.cond.wait(&mut inner);
        }
    }

    /// Destroys the queue: rejects further `put`s and wakes every waiter. Idempotent.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        drop(inner);
        self.cond.notify_all();
    }

    /// True once [`destroy`](Self::destroy) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of queued items (snapshot).
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// True if nothing is queued (snapshot).
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Stable in-place reorder of the queued items.
    pub fn sort_by<F>(&self, cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.inner.lock().items.make_contiguous().sort_by(cmp);
    }

    /// Removes every queued item at once (bulk take). Never blocks.
    pub fn drain_all(&self) -> Vec<T> {
        self.inner.lock().items.drain(..).collect()
    }

    /// Removes and returns the items matching `pred`, keeping the relative order of the rest.
    pub fn extract_if<P>(&self, mut pred: P) -> Vec<T>
    where
        P: FnMut(&T) -> bool,
    {
        let mut inner = self.inner.lock();
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(inner.items.len());
        for item in inner.items.drain(..) {
            if pred(&item) {
                taken.push(item);
            } else {
                kept.push_back(item);
            }
        }
        inner.items = kept;
        taken
    }

    /// Keeps only the items for which `pred` returns `true`.
    pub fn retain<P>(&self, pred: P)
    where
        P: FnMut(&T) -> bool,
    {
        self.inner.lock().items.retain(pred);
    }

    /// Visits every queued item in order, mutably.
    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&mut T),
    {
        self.inner.lock().items.iter_mut().for_each(f);
    }

    /// Drains this queue through `f` into a new open queue (bulk transform).
    pub fn transform<U, F>(&self, f: F) -> ThreadSafeQueue<U>
    where
        F: FnMut(T) -> U,
    {
        let items: VecDeque<U> = self.inner.lock().items.drain(..).map(f).collect();
        ThreadSafeQueue {
            inner: Mutex::new(Inner {
                items,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Drops every queued item.
    pub fn clear(&self) {
        self.inner.lock().items.clear();
    }
}

impl<T: Clone> ThreadSafeQueue<T> {
    /// Blocks until the queue is non-empty and returns a copy of the front item.
    pub fn front(&self) -> Option<T> {
        self.peek_with(|items| items.front().cloned())
    }

    /// Blocks until the queue is non-empty and returns a copy of the back item.
    pub fn back(&self) -> Option<T> {
        self.peek_with(|items| items.back().cloned())
    }

    /// Copies the current contents in order (snapshot).
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.lock().items.iter().cloned().collect()
    }

    fn peek_with<F>(&self, f: F) -> Option<T>
    where
        F: Fn(&VecDeque<T>) -> Option<T>,
    {
        let mut inner = self.inner.lock();
        loop {
            if let Some(v) = f(&inner.items) {
                return Some(v);
            }
            if inner.closed {
                return None;
            }
            self.cond.wait(&mut inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_single_producer_fifo() {
        let q = Arc::new(ThreadSafeQueue::new());
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..1_000 {
                    q.put(i).unwrap();
                }
                q.destroy();
            })
        };

        let mut received = Vec::new();
        while let Some(v) = q.take() {
            received.push(v);
        }
        producer.join().unwrap();
        assert_eq!(received, (0..1_000).collect::<Vec<_>>());
    }

    #[test]
    fn test_destroy_drains_then_returns_none() {
        let q = ThreadSafeQueue::new();
        q.put("a").unwrap();
        q.put("b").unwrap();
        q.destroy();
        q.destroy();

        assert_eq!(q.put("c"), Err(QueueError::Closed));
        assert_eq!(q.take(), Some("a"));
        assert_eq!(q.take(), Some("b"));
        assert_eq!(q.take(), None);
        assert_eq!(q.take(), None);
    }

    #[test]
    fn test_destroy_wakes_blocked_taker() {
        let q: Arc<ThreadSafeQueue<u8>> = Arc::new(ThreadSafeQueue::new());
        let waiter = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.take())
        };
        thread::sleep(Duration::from_millis(20));
        q.destroy();
        assert_eq!(waiter.join().unwrap(), None);
    }

    #[test]
    fn test_wait_for_predicate() {
        let q = Arc::new(ThreadSafeQueue::new());
        let waiter = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.wait_for(|items| items.len() >= 3))
        };
        q.put(1).unwrap();
        q.put(2).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.len(), 2);
        q.put(3).unwrap();
        assert_eq!(waiter.join().unwrap(), Some(1));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_front_and_back_block_until_item() {
        let q = Arc::new(ThreadSafeQueue::new());
        let peeker = {
            let q = Arc::clone(&q);
            thread::spawn(move || (q.front(), q.back()))
        };
        thread::sleep(Duration::from_millis(10));
        q.put_all([5, 6, 7]).unwrap();
        assert_eq!(peeker.join().unwrap(), (Some(5), Some(7)));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn test_sort_is_stable() {
        let q = ThreadSafeQueue::new();
        q.put_all([(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')]).unwrap();
        q.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(q.to_vec(), vec![(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
    }

    #[test]
    fn test_bulk_take_and_transform() {
        let q = ThreadSafeQueue::new();
        q.put_all(1..=6).unwrap();

        let evens = q.extract_if(|v| v % 2 == 0);
        assert_eq!(evens, vec![2, 4, 6]);
        assert_eq!(q.to_vec(), vec![1, 3, 5]);

        let strings = q.transform(|v| format!("#{v}"));
        assert!(q.is_empty());
        assert_eq!(strings.drain_all(), vec!["#1", "#3", "#5"]);
    }

    #[test]
    fn test_take_timeout_expires() {
        let q: ThreadSafeQueue<u8> = ThreadSafeQueue::new();
        let started = Instant::now();
        assert_eq!(q.take_timeout(Duration::from_millis(30)), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_take_timeout_with_unbounded_duration() {
        let q = ThreadSafeQueue::new();
        q.put(1).unwrap();
        assert_eq!(q.take_timeout(Duration::MAX), Some(1));

        q.destroy();
        assert_eq!(q.take_timeout(Duration::MAX), None);
    }
}
