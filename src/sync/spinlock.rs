use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use super::RawSpinlock;

/// Spins before [`Spinlock`] starts yielding the thread.
const SPIN_BUDGET: u32 = 64;

/// Test-and-test-and-set spinlock.
///
/// Spins on a relaxed load (no cache-line ping-pong while contended) and yields to the
/// scheduler once [`SPIN_BUDGET`] iterations pass without progress.
#[derive(Debug, Default)]
pub struct Spinlock {
    locked: AtomicBool,
}

impl Spinlock {
    /// Creates an unlocked spinlock.
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquires the lock and returns an RAII guard.
    pub fn guard(&self) -> SpinGuard<'_, Self> {
        RawSpinlock::lock(self);
        SpinGuard { lock: self }
    }
}

impl RawSpinlock for Spinlock {
    fn lock(&self) {
        let mut spins = 0u32;
        loop {
            if !self.locked.swap(true, Ordering::Acquire) {
                return;
            }
            while self.locked.load(Ordering::Relaxed) {
                if spins < SPIN_BUDGET {
                    spins += 1;
                    hint::spin_loop();
                } else {
                    thread::yield_now();
                }
            }
        }
    }

    fn try_lock(&self) -> bool {
        !self.locked.load(Ordering::Relaxed) && !self.locked.swap(true, Ordering::Acquire)
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Spinlock without any fairness or back-off.
///
/// Every waiter hammers the flag with `compare_exchange_weak`; whichever core wins the cache
/// line takes the lock. Suitable only for critical sections of a few instructions.
#[derive(Debug, Default)]
pub struct UnfairSpinlock {
    locked: AtomicBool,
}

impl UnfairSpinlock {
    /// Creates an unlocked spinlock.
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquires the lock and returns an RAII guard.
    pub fn guard(&self) -> SpinGuard<'_, Self> {
        RawSpinlock::lock(self);
        SpinGuard { lock: self }
    }
}

impl RawSpinlock for UnfairSpinlock {
    fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// RAII guard releasing a [`RawSpinlock`] on drop.
#[must_use = "dropping the guard immediately releases the lock"]
pub struct SpinGuard<'a, L: RawSpinlock> {
    lock: &'a L,
}

impl<L: RawSpinlock> Drop for SpinGuard<'_, L> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::UnsafeCell;

    struct Counter<L> {
        lock: L,
        value: UnsafeCell<u64>,
    }

    unsafe impl<L: RawSpinlock> Sync for Counter<L> {}

    fn hammer<L: RawSpinlock + Default>() -> u64 {
        let counter = Counter {
            lock: L::default(),
            value: UnsafeCell::new(0),
        };
        let shared = &counter;
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(move || {
                    for _ in 0..10_000 {
                        shared.lock.lock();
                        // SAFETY: the spinlock is held.
                        unsafe { *shared.value.get() += 1 };
                        shared.lock.unlock();
                    }
                });
            }
        });
        counter.value.into_inner()
    }

    #[test]
    fn test_spinlock_mutual_exclusion() {
        assert_eq!(hammer::<Spinlock>(), 40_000);
    }

    #[test]
    fn test_unfair_spinlock_mutual_exclusion() {
        assert_eq!(hammer::<UnfairSpinlock>(), 40_000);
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        let lock = Spinlock::new();
        let guard = lock.guard();
        assert!(lock.is_locked());
        assert!(!lock.try_lock());
        drop(guard);
        assert!(lock.try_lock());
        lock.unlock();
        assert!(!lock.is_locked());
    }
}
