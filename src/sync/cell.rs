use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};

use super::{RawSpinlock, Spinlock};

/// Data guarded by a spinlock of choice.
///
/// ```
/// use taskcore::{SpinCell, TicketSpinlock};
///
/// let cell: SpinCell<Vec<u32>, TicketSpinlock> = SpinCell::new(Vec::new());
/// cell.lock().push(7);
/// assert_eq!(*cell.lock(), vec![7]);
/// ```
pub struct SpinCell<T, L: RawSpinlock = Spinlock> {
    lock: L,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `lock`.
unsafe impl<T: Send, L: RawSpinlock> Send for SpinCell<T, L> {}
// SAFETY: access to `data` is serialized by `lock`.
unsafe impl<T: Send, L: RawSpinlock> Sync for SpinCell<T, L> {}

impl<T, L: RawSpinlock + Default> SpinCell<T, L> {
    /// Wraps `value` behind a fresh lock.
    pub fn new(value: T) -> Self {
        Self {
            lock: L::default(),
            data: UnsafeCell::new(value),
        }
    }
}

impl<T, L: RawSpinlock> SpinCell<T, L> {
    /// Spins until the lock is acquired.
    pub fn lock(&self) -> SpinCellGuard<'_, T, L> {
        self.lock.lock();
        SpinCellGuard { cell: self }
    }

    /// Acquires the lock only if it is free.
    pub fn try_lock(&self) -> Option<SpinCellGuard<'_, T, L>> {
        if self.lock.try_lock() {
            Some(SpinCellGuard { cell: self })
        } else {
            None
        }
    }

    /// Mutable access without locking (exclusive borrow proves no other holder).
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consumes the cell, returning the data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default, L: RawSpinlock + Default> Default for SpinCell<T, L> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, L: RawSpinlock> fmt::Debug for SpinCell<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinCell")
            .field("locked", &self.lock.is_locked())
            .finish_non_exhaustive()
    }
}

/// Guard giving access to the data of a [`SpinCell`].
#[must_use = "dropping the guard immediately releases the lock"]
pub struct SpinCellGuard<'a, T, L: RawSpinlock> {
    cell: &'a SpinCell<T, L>,
}

impl<T, L: RawSpinlock> Deref for SpinCellGuard<'_, T, L> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard exists only while the lock is held.
        unsafe { &*self.cell.data.get() }
    }
}

impl<T, L: RawSpinlock> DerefMut for SpinCellGuard<'_, T, L> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard exists only while the lock is held.
        unsafe { &mut *self.cell.data.get() }
    }
}

impl<T, L: RawSpinlock> Drop for SpinCellGuard<'_, T, L> {
    fn drop(&mut self) {
        self.cell.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{TicketSpinlock, UnfairSpinlock};
    use std::thread;

    #[test]
    fn test_spin_cell_counts_under_contention() {
        let cell: SpinCell<u64> = SpinCell::new(0);
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..5_000 {
                        *cell.lock() += 1;
                    }
                });
            }
        });
        assert_eq!(cell.into_inner(), 20_000);
    }

    #[test]
    fn test_try_lock_on_each_flavour() {
        let a: SpinCell<u8, UnfairSpinlock> = SpinCell::new(1);
        let b: SpinCell<u8, TicketSpinlock> = SpinCell::new(2);

        let ga = a.lock();
        assert!(a.try_lock().is_none());
        drop(ga);
        assert_eq!(*a.try_lock().expect("free"), 1);

        let gb = b.lock();
        assert!(b.try_lock().is_none());
        drop(gb);
        assert_eq!(*b.try_lock().expect("free"), 2);
    }

    #[test]
    fn test_failed_try_lock_keeps_holder() {
        let cell: SpinCell<u32, TicketSpinlock> = SpinCell::new(0);
        let mut held = cell.lock();
        assert!(cell.try_lock().is_none());
        assert!(cell.try_lock().is_none());
        *held += 1;
        drop(held);

        let mut again = cell.try_lock().expect("released");
        *again += 1;
        assert!(cell.try_lock().is_none());
        drop(again);
        assert_eq!(*cell.lock(), 2);
    }
}
