//! # Low-level mutual exclusion.
//!
//! Busy-waiting locks for very short critical sections:
//! - [`Spinlock`] test-and-test-and-set lock that yields to the OS scheduler after a spin budget;
//! - [`UnfairSpinlock`] plain swap loop, never yields (lowest latency, no fairness);
//! - [`TicketSpinlock`] FIFO-fair lock whose release is bound to the ticket handed out by `lock()`.
//!
//! All three implement [`RawSpinlock`], which lets [`SpinCell`] wrap data behind any of them.
//!
//! ```text
//! SpinCell<T, L> ── lock() ──► L::lock() ──► SpinCellGuard (Deref<T>) ── drop ──► L::unlock()
//! ```
//!
//! ## Rules
//! - Never hold a spin guard across `.await` or a blocking call.
//! - `TicketSpinlock::unlock(ticket)` must receive the ticket returned by the matching `lock()`.

mod cell;
mod spinlock;
mod ticket;

pub use cell::{SpinCell, SpinCellGuard};
pub use spinlock::{SpinGuard, Spinlock, UnfairSpinlock};
pub use ticket::{TicketGuard, TicketSpinlock};

/// Raw lock without associated data.
pub trait RawSpinlock: Send + Sync {
    /// Spins until the lock is acquired.
    fn lock(&self);

    /// Attempts to acquire the lock without spinning.
    fn try_lock(&self) -> bool;

    /// Releases the lock. Must only be called by the current holder.
    fn unlock(&self);

    /// Returns `true` if the lock is currently held by someone.
    fn is_locked(&self) -> bool;
}
