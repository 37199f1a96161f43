//! Wake channels: native condition variables for macro threads and
//! interrupt completions.
//!
//! These sit outside the ticket scheme. Each channel owns its own mutex and
//! a generation counter; a notification bumps the generation so a waiter can
//! tell a real wakeup from a spurious one.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::queued_mutex::{WaitOutcome, cond_nanosleep};

#[derive(Debug, Default)]
pub struct WakeChannel {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl WakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every thread blocked in [`wait_timeout`](Self::wait_timeout).
    pub fn notify_all(&self) {
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.cond.notify_all();
    }

    /// Number of notifications sent so far.
    pub fn generation(&self) -> u64 {
        *self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the next notification or until `timeout` elapses.
    ///
    /// Spurious wakeups are absorbed: only a notification issued after this
    /// call started returns [`WaitOutcome::Signaled`].
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return WaitOutcome::ClockUnavailable;
        };
        let mut guard = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let start = *guard;
        loop {
            if *guard != start {
                return WaitOutcome::Signaled;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return WaitOutcome::TimedOut;
            }
            let (g, outcome) = cond_nanosleep(&self.cond, guard, remaining);
            guard = g;
            if outcome == WaitOutcome::TimedOut && *guard == start {
                return WaitOutcome::TimedOut;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_without_notify_times_out() {
        let ch = WakeChannel::new();
        assert_eq!(
            ch.wait_timeout(Duration::from_millis(10)),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn notify_bumps_generation() {
        let ch = WakeChannel::new();
        ch.notify_all();
        ch.notify_all();
        assert_eq!(ch.generation(), 2);
    }

    #[test]
    fn notify_wakes_waiter() {
        let ch = Arc::new(WakeChannel::new());
        let waiter = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.wait_timeout(Duration::from_secs(10)))
        };
        // Keep notifying until the waiter has observed one.
        while !waiter.is_finished() {
            ch.notify_all();
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Signaled);
    }

    #[test]
    fn huge_timeout_reports_clock() {
        let ch = WakeChannel::new();
        assert_eq!(
            ch.wait_timeout(Duration::MAX),
            WaitOutcome::ClockUnavailable
        );
    }
}
