//! Bounded exponential backoff schedule.

use std::time::Duration;

/// Retry schedule for device discovery.
///
/// `steps` is the total number of attempts. Between two attempts the caller
/// waits for the current `duration`, which is then multiplied by `factor`.
/// A schedule with `steps` attempts therefore yields `steps - 1` delays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub duration: Duration,
    pub factor: f64,
    pub steps: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(1),
            factor: 1.1,
            steps: 15,
        }
    }
}

impl Backoff {
    /// Delay to wait before the next attempt, or `None` when the attempt just
    /// made was the last one.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.steps <= 1 {
            self.steps = 0;
            return None;
        }
        self.steps -= 1;
        let delay = self.duration;
        self.duration =
            Duration::try_from_secs_f64(delay.as_secs_f64() * self.factor).unwrap_or(Duration::MAX);
        Some(delay)
    }

    /// Sum of every delay the schedule can produce.
    pub fn total_delay(&self) -> Duration {
        let mut schedule = *self;
        let mut total = Duration::ZERO;
        while let Some(delay) = schedule.next_delay() {
            total = total.saturating_add(delay);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_grows_by_ten_percent() {
        let mut backoff = Backoff::default();
        let first = backoff.next_delay().unwrap();
        let second = backoff.next_delay().unwrap();
        let third = backoff.next_delay().unwrap();
        assert_eq!(first, Duration::from_secs(1));
        assert!((second.as_secs_f64() - 1.1).abs() < 1e-9);
        assert!((third.as_secs_f64() - 1.21).abs() < 1e-9);
    }

    #[test]
    fn fifteen_steps_yield_fourteen_delays() {
        let mut backoff = Backoff::default();
        let mut delays = 0;
        while backoff.next_delay().is_some() {
            delays += 1;
        }
        assert_eq!(delays, 14);
        assert_eq!(backoff.steps, 0);
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn single_step_never_waits() {
        let mut backoff = Backoff {
            steps: 1,
            ..Backoff::default()
        };
        assert!(backoff.next_delay().is_none());
        assert_eq!(Backoff { steps: 1, ..Backoff::default() }.total_delay(), Duration::ZERO);
    }

    #[test]
    fn default_total_delay_is_under_thirty_seconds() {
        let total = Backoff::default().total_delay();
        assert!(total > Duration::from_secs(27));
        assert!(total < Duration::from_secs(29));
    }

    #[test]
    fn huge_factor_saturates_instead_of_panicking() {
        let mut backoff = Backoff {
            duration: Duration::from_secs(1),
            factor: 1e300,
            steps: 5,
        };
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), Some(Duration::MAX));
    }
}
