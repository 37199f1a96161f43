//! Fair queue lock: ticket-based mutual exclusion with strict FIFO admission.
//!
//! A plain `std::sync::Mutex` makes no ordering promise: a thread that just
//! released the lock can grab it again before a waiter wakes up. The input
//! reader, macro players and command handler of a device all contend for the
//! same state, so admission here is by ticket. Every `lock()` draws the next
//! ticket and waits until the served counter reaches it.
//!
//! Counters are `u64`. At one acquisition per nanosecond they would take
//! centuries to wrap, so wraparound is not handled.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Result of a bounded wait on a condition variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The condition was notified (or woke spuriously) before the deadline.
    Signaled,
    /// The deadline passed without a notification.
    TimedOut,
    /// The monotonic clock could not produce a deadline for this duration.
    ClockUnavailable,
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitOutcome::Signaled => write!(f, "signaled"),
            WaitOutcome::TimedOut => write!(f, "timed out"),
            WaitOutcome::ClockUnavailable => write!(f, "monotonic clock unavailable"),
        }
    }
}

/// Snapshot of a lock's ticket counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tickets {
    /// Next ticket to hand out (tickets issued so far).
    pub next_waiting: u64,
    /// Ticket currently allowed in.
    pub next_in: u64,
}

impl Tickets {
    /// Threads holding a ticket that has not been released yet (holder included).
    pub fn outstanding(&self) -> u64 {
        self.next_waiting - self.next_in
    }

    fn is_idle(&self) -> bool {
        self.next_waiting == self.next_in
    }
}

/// Wait on `cond` for at most `timeout`, measured on the monotonic clock.
///
/// Works with any mutex/condition pair; it is independent of the ticket
/// queue. The guard is handed back in every case so the caller keeps the
/// mutex. A timeout too large to express as a deadline yields
/// [`WaitOutcome::ClockUnavailable`] without waiting.
pub fn cond_nanosleep<'a, T>(
    cond: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
) -> (MutexGuard<'a, T>, WaitOutcome) {
    if Instant::now().checked_add(timeout).is_none() {
        return (guard, WaitOutcome::ClockUnavailable);
    }
    let (guard, result) = cond
        .wait_timeout(guard, timeout)
        .unwrap_or_else(PoisonError::into_inner);
    let outcome = if result.timed_out() {
        WaitOutcome::TimedOut
    } else {
        WaitOutcome::Signaled
    };
    (guard, outcome)
}

/// Ticket lock owning the value it protects.
pub struct QueuedMutex<T> {
    tickets: Mutex<Tickets>,
    turn: Condvar,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is only handed out through a `QueuedGuard`, and
// the ticket protocol admits exactly one guard at a time.
unsafe impl<T: Send> Send for QueuedMutex<T> {}
unsafe impl<T: Send> Sync for QueuedMutex<T> {}

impl<T: Default> Default for QueuedMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for QueuedMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedMutex")
            .field("tickets", &self.tickets())
            .finish_non_exhaustive()
    }
}

impl<T> QueuedMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            tickets: Mutex::new(Tickets::default()),
            turn: Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// The counters never leave a torn state, so a poisoned inner mutex is
    /// still safe to use.
    fn counters(&self) -> MutexGuard<'_, Tickets> {
        self.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Draw a ticket and block until it is served.
    fn wait_turn<'a>(&'a self, mut t: MutexGuard<'a, Tickets>) -> MutexGuard<'a, Tickets> {
        let my_turn = t.next_waiting;
        t.next_waiting += 1;
        while t.next_in != my_turn {
            t = self.turn.wait(t).unwrap_or_else(PoisonError::into_inner);
        }
        t
    }

    /// Acquire the lock, queueing behind every earlier caller.
    ///
    /// Blocks until all previously issued tickets have been released.
    pub fn lock(&self) -> QueuedGuard<'_, T> {
        let t = self.counters();
        drop(self.wait_turn(t));
        QueuedGuard::new(self)
    }

    /// Acquire the lock only if nobody holds it or waits for it.
    ///
    /// Never blocks on the queue; on failure the counters are left untouched.
    pub fn try_lock(&self) -> Option<QueuedGuard<'_, T>> {
        let mut t = self.counters();
        if !t.is_idle() {
            return None;
        }
        t.next_waiting += 1;
        Some(QueuedGuard::new(self))
    }

    /// Current ticket counters.
    pub fn tickets(&self) -> Tickets {
        *self.counters()
    }

    /// Number of threads queued behind the current holder.
    pub fn waiting(&self) -> u64 {
        self.tickets().outstanding().saturating_sub(1)
    }

    /// Mutable access without locking; the borrow proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    fn release(&self) {
        let mut t = self.counters();
        t.next_in += 1;
        drop(t);
        self.turn.notify_all();
    }
}

/// Exclusive access to the value behind a [`QueuedMutex`].
///
/// Dropping the guard releases the lock and admits the next ticket.
///
/// A shared guard hands out `&T`, so the guard is only `Sync` when `T` is:
///
/// ```compile_fail
/// use std::cell::Cell;
/// use periphd_lib::queued_mutex::QueuedGuard;
///
/// fn assert_sync<S: Sync>() {}
/// assert_sync::<QueuedGuard<'static, Cell<u8>>>();
/// ```
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct QueuedGuard<'a, T> {
    mutex: &'a QueuedMutex<T>,
    _value: PhantomData<&'a mut T>,
}

impl<'a, T> QueuedGuard<'a, T> {
    fn new(mutex: &'a QueuedMutex<T>) -> Self {
        QueuedGuard {
            mutex,
            _value: PhantomData,
        }
    }

    /// Whether this guard was handed out by `mutex`.
    pub fn is_guard_of(&self, mutex: &QueuedMutex<T>) -> bool {
        std::ptr::eq(self.mutex, mutex)
    }

    /// Release the lock explicitly.
    pub fn unlock(self) {
        drop(self);
    }

    /// Give up the lock, sleep on `cond` for at most `timeout`, then queue
    /// again at the tail.
    ///
    /// Other threads are admitted while this one sleeps, and any thread that
    /// called `lock()` during the sleep is served first: the original queue
    /// position is lost. `cond` must only ever be waited on through this
    /// lock; waking it needs nothing more than `notify_one`/`notify_all`.
    pub fn cond_nanosleep(&mut self, cond: &Condvar, timeout: Duration) -> WaitOutcome {
        let mutex = self.mutex;
        let mut t = mutex.counters();

        t.next_in += 1;
        mutex.turn.notify_all();

        let (t, outcome) = cond_nanosleep(cond, t, timeout);
        drop(mutex.wait_turn(t));
        outcome
    }
}

impl<T> Deref for QueuedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard's ticket is the one being served.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for QueuedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and `&mut self` rules out aliasing through this guard.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for QueuedGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

impl<T: fmt::Debug> fmt::Debug for QueuedGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn new_lock_is_idle() {
        let m = QueuedMutex::new(0u32);
        assert_eq!(m.tickets(), Tickets::default());
        assert_eq!(m.waiting(), 0);
    }

    #[test]
    fn lock_and_release_advance_counters_by_one() {
        let m = QueuedMutex::new(0u32);
        let mut g = m.lock();
        *g += 1;
        assert_eq!(
            m.tickets(),
            Tickets {
                next_waiting: 1,
                next_in: 0
            }
        );
        drop(g);
        assert_eq!(
            m.tickets(),
            Tickets {
                next_waiting: 1,
                next_in: 1
            }
        );
        assert_eq!(*m.lock(), 1);
    }

    #[test]
    fn try_lock_succeeds_when_idle() {
        let m = QueuedMutex::new(());
        let g = m.try_lock();
        assert!(g.is_some());
        assert_eq!(m.tickets().next_waiting, 1);
    }

    #[test]
    fn try_lock_fails_without_touching_counters() {
        let m = QueuedMutex::new(());
        let _held = m.lock();
        let before = m.tickets();
        assert!(m.try_lock().is_none());
        assert_eq!(m.tickets(), before);
    }

    #[test]
    fn unlock_is_same_as_drop() {
        let m = QueuedMutex::new(());
        m.lock().unlock();
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn standalone_wait_times_out() {
        let pair = (Mutex::new(()), Condvar::new());
        let guard = pair.0.lock().unwrap();
        let (_guard, outcome) = cond_nanosleep(&pair.1, guard, Duration::from_millis(5));
        // A spurious wakeup is allowed to report Signaled.
        assert_ne!(outcome, WaitOutcome::ClockUnavailable);
    }

    #[test]
    fn standalone_wait_reports_unrepresentable_deadline() {
        let pair = (Mutex::new(()), Condvar::new());
        let guard = pair.0.lock().unwrap();
        let (_guard, outcome) = cond_nanosleep(&pair.1, guard, Duration::MAX);
        assert_eq!(outcome, WaitOutcome::ClockUnavailable);
    }

    #[test]
    fn standalone_wait_is_signaled() {
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let waiter = {
            let pair = Arc::clone(&pair);
            thread::spawn(move || {
                let mut guard = pair.0.lock().unwrap();
                while !*guard {
                    let (g, outcome) = cond_nanosleep(&pair.1, guard, Duration::from_secs(10));
                    guard = g;
                    if outcome == WaitOutcome::TimedOut {
                        return outcome;
                    }
                }
                WaitOutcome::Signaled
            })
        };
        *pair.0.lock().unwrap() = true;
        pair.1.notify_all();
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Signaled);
    }

    #[test]
    fn requeue_wait_releases_then_reacquires() {
        let m = QueuedMutex::new(0u32);
        let cond = Condvar::new();
        let mut g = m.lock();
        let outcome = g.cond_nanosleep(&cond, Duration::from_millis(1));
        assert_ne!(outcome, WaitOutcome::ClockUnavailable);
        // Original ticket released, a fresh one drawn and now served.
        assert_eq!(
            m.tickets(),
            Tickets {
                next_waiting: 2,
                next_in: 1
            }
        );
        *g = 7;
        drop(g);
        assert_eq!(*m.lock(), 7);
    }

    #[test]
    fn guard_is_shareable_only_for_sync_values() {
        fn assert_send_sync<S: Send + Sync>() {}
        assert_send_sync::<QueuedGuard<'static, u64>>();
        assert_send_sync::<QueuedMutex<std::cell::Cell<u64>>>();
    }

    #[test]
    fn guard_knows_its_lock() {
        let a = QueuedMutex::new(0u8);
        let b = QueuedMutex::new(0u8);
        let g = a.lock();
        assert!(g.is_guard_of(&a));
        assert!(!g.is_guard_of(&b));
    }

    #[test]
    fn debug_shows_tickets() {
        let m = QueuedMutex::new(1u8);
        let s = format!("{m:?}");
        assert!(s.contains("next_waiting"), "got: {s}");
    }

    #[test]
    fn wait_outcome_display() {
        assert_eq!(WaitOutcome::TimedOut.to_string(), "timed out");
        assert_eq!(
            WaitOutcome::ClockUnavailable.to_string(),
            "monotonic clock unavailable"
        );
    }
}
