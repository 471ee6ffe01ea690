//! Cancellable sleeping.

use crate::{CancelToken, SleepOutcome};
use std::time::Duration;

/// Clock trait. The only place where device discovery blocks.
pub trait ClockOps {
    /// Sleep for `duration`, waking early when `cancel` fires.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> SleepOutcome;
}
