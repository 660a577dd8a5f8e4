// src/state/timeout.rs

use std::time::Duration;

use super::EpochMillis;

/// A deadline made of a start time and a threshold.
///
/// A start of `0` means the timeout is not running; a zero threshold disables
/// it entirely. Concurrency is the owning job's concern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeout {
    start: EpochMillis,
    threshold: Duration,
}

impl Timeout {
    pub fn new(threshold: Duration) -> Self {
        Self {
            start: 0,
            threshold,
        }
    }

    pub fn start(&mut self, now: EpochMillis) {
        self.start = now;
    }

    pub fn cancel(&mut self) {
        self.start = 0;
    }

    pub fn set_threshold(&mut self, threshold: Duration) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn start_time(&self) -> EpochMillis {
        self.start
    }

    pub fn is_started(&self) -> bool {
        self.start > 0 && !self.threshold.is_zero()
    }

    /// Instant at which the timeout fires.
    pub fn trigger(&self) -> EpochMillis {
        let threshold = i64::try_from(self.threshold.as_millis()).unwrap_or(i64::MAX);
        self.start.saturating_add(threshold)
    }

    pub fn is_triggered(&self, now: EpochMillis) -> bool {
        self.is_started() && self.trigger() <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_triggered_before_start() {
        let timeout = Timeout::new(Duration::from_millis(100));
        assert!(!timeout.is_started());
        assert!(!timeout.is_triggered(i64::MAX));
    }

    #[test]
    fn triggers_once_threshold_elapsed() {
        let mut timeout = Timeout::new(Duration::from_millis(100));
        timeout.start(1_000);

        assert!(timeout.is_started());
        assert_eq!(timeout.trigger(), 1_100);
        assert!(!timeout.is_triggered(1_099));
        assert!(timeout.is_triggered(1_100));
        assert!(timeout.is_triggered(5_000));
    }

    #[test]
    fn cancel_is_permanent_until_restarted() {
        let mut timeout = Timeout::new(Duration::from_millis(100));
        timeout.start(1_000);
        timeout.cancel();

        assert!(!timeout.is_started());
        assert!(!timeout.is_triggered(1_100));
        assert!(!timeout.is_triggered(i64::MAX));
    }

    #[test]
    fn zero_threshold_disables() {
        let mut timeout = Timeout::new(Duration::ZERO);
        timeout.start(1_000);
        assert!(!timeout.is_started());
        assert!(!timeout.is_triggered(10_000));

        timeout.set_threshold(Duration::from_secs(1));
        assert!(timeout.is_triggered(2_000));
    }
}
