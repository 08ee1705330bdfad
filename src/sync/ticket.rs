use std::hint;
use std::sync::atomic::{AtomicU64, Ordering};

use super::RawSpinlock;

/// FIFO-fair spinlock.
///
/// `lock()` hands out a monotonically increasing ticket and spins until that ticket is being
/// served. Release is bound to the ticket value, not to the acquiring thread: whoever holds the
/// ticket may pass it to [`TicketSpinlock::unlock`].
///
/// ```
/// use taskcore::TicketSpinlock;
///
/// let lock = TicketSpinlock::new();
/// let ticket = lock.lock();
/// assert_eq!(ticket, 0);
/// lock.unlock(ticket);
/// assert_eq!(lock.lock(), 1);
/// ```
#[derive(Debug, Default)]
pub struct TicketSpinlock {
    next_ticket: AtomicU64,
    now_serving: AtomicU64,
}

impl TicketSpinlock {
    /// Creates an unlocked ticket lock.
    pub const fn new() -> Self {
        Self {
            next_ticket: AtomicU64::new(0),
            now_serving: AtomicU64::new(0),
        }
    }

    /// Takes a ticket and spins until it is served. Returns the ticket.
    pub fn lock(&self) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        while self.now_serving.load(Ordering::Acquire) != ticket {
            hint::spin_loop();
        }
        ticket
    }

    /// Takes a ticket only if nobody holds or waits for the lock.
    pub fn try_lock(&self) -> Option<u64> {
        let serving = self.now_serving.load(Ordering::Acquire);
        self.next_ticket
            .compare_exchange(serving, serving + 1, Ordering::Acquire, Ordering::Relaxed)
            .ok()
    }

    /// Releases the lock held under `ticket`, admitting the next ticket in line.
    pub fn unlock(&self, ticket: u64) {
        debug_assert_eq!(
            self.now_serving.load(Ordering::Relaxed),
            ticket,
            "unlock with a ticket that is not being served"
        );
        self.now_serving.store(ticket.wrapping_add(1), Ordering::Release);
    }

    /// Ticket currently being served.
    pub fn serving(&self) -> u64 {
        self.now_serving.load(Ordering::Relaxed)
    }

    /// Number of threads holding or waiting for the lock.
    pub fn queue_len(&self) -> u64 {
        self.next_ticket
            .load(Ordering::Relaxed)
            .wrapping_sub(self.now_serving.load(Ordering::Relaxed))
    }

    /// Acquires the lock and returns an RAII guard carrying the ticket.
    pub fn guard(&self) -> TicketGuard<'_> {
        let ticket = self.lock();
        TicketGuard { lock: self, ticket }
    }
}

impl RawSpinlock for TicketSpinlock {
    fn lock(&self) {
        TicketSpinlock::lock(self);
    }

    fn try_lock(&self) -> bool {
        TicketSpinlock::try_lock(self).is_some()
    }

    fn unlock(&self) {
        self.now_serving.fetch_add(1, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.queue_len() > 0
    }
}

/// RAII guard for [`TicketSpinlock`]; unlocks with its ticket on drop.
#[must_use = "dropping the guard immediately releases the lock"]
pub struct TicketGuard<'a> {
    lock: &'a TicketSpinlock,
    ticket: u64,
}

impl TicketGuard<'_> {
    /// Ticket this guard was admitted with.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock(self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    #[test]
    fn test_tickets_are_sequential() {
        let lock = TicketSpinlock::new();
        for expected in 0..5 {
            let t = lock.lock();
            assert_eq!(t, expected);
            lock.unlock(t);
        }
        assert_eq!(lock.serving(), 5);
        assert_eq!(lock.queue_len(), 0);
    }

    #[test]
    fn test_try_lock_respects_holder() {
        let lock = TicketSpinlock::new();
        let held = lock.try_lock().expect("free lock");
        assert!(lock.try_lock().is_none());
        lock.unlock(held);
        assert_eq!(lock.try_lock(), Some(1));
    }

    #[test]
    fn test_unlock_from_another_thread_with_ticket() {
        let lock = TicketSpinlock::new();
        let ticket = lock.lock();
        thread::scope(|s| {
            s.spawn(|| lock.unlock(ticket));
        });
        assert!(!RawSpinlock::is_locked(&lock));
    }

    #[test]
    fn test_guard_serializes_writers() {
        let lock = TicketSpinlock::new();
        let log = Mutex::new(Vec::new());
        thread::scope(|s| {
            for i in 0..4 {
                let lock = &lock;
                let log = &log;
                s.spawn(move || {
                    for _ in 0..100 {
                        let g = lock.guard();
                        log.lock().unwrap().push((i, g.ticket()));
                    }
                });
            }
        });
        let log = log.into_inner().unwrap();
        let mut tickets: Vec<u64> = log.iter().map(|(_, t)| *t).collect();
        tickets.sort_unstable();
        assert_eq!(tickets, (0..400).collect::<Vec<_>>());
    }
}
