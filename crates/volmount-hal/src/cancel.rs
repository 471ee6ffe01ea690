//! Cooperative cancellation with an optional deadline.
//!
//! A [`CancelToken`] is shared between the caller driving an operation and the
//! operation itself. Cancelling it (or reaching its deadline) wakes any
//! in-progress [`CancelToken::wait_timeout`] immediately.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Result of a cancellable sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// The full duration elapsed.
    Elapsed,
    /// The token was cancelled or its deadline passed before the duration elapsed.
    Cancelled,
}

#[derive(Debug, Default)]
struct Shared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, bool> {
        // A poisoned flag is still a valid flag.
        self.cancelled.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().child_with_timeout(timeout)
    }

    /// Derive a token sharing this token's cancel flag, with a deadline no later
    /// than `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(existing), Some(new)) => Some(existing.min(new)),
            (existing, None) => existing,
            (None, new) => new,
        };
        Self {
            shared: Arc::clone(&self.shared),
            deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        let mut cancelled = self.shared.lock();
        *cancelled = true;
        self.shared.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shared.lock() || self.deadline_passed(Instant::now())
    }

    fn deadline_passed(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// Block for up to `duration`, returning early if the token is cancelled or
    /// its deadline passes.
    pub fn wait_timeout(&self, duration: Duration) -> SleepOutcome {
        let start = Instant::now();
        let wake_at = start.checked_add(duration);
        let mut cancelled = self.shared.lock();

        loop {
            let now = Instant::now();
            if *cancelled || self.deadline_passed(now) {
                return SleepOutcome::Cancelled;
            }
            let until = match (wake_at, self.deadline) {
                (Some(w), Some(d)) => w.min(d),
                (Some(w), None) => w,
                (None, Some(d)) => d,
                // Effectively forever; only a cancel() can end this wait.
                (None, None) => now + Duration::from_secs(3600),
            };
            if wake_at.is_some_and(|w| now >= w) {
                return SleepOutcome::Elapsed;
            }
            let remaining = until.saturating_duration_since(now);
            cancelled = match self.shared.wake.wait_timeout(cancelled, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}
