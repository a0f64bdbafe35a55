//! Per-window call accounting
//!
//! `Metrics` is owned by the breaker and only touched while the breaker's
//! lock is held, so it carries no synchronization of its own.

use std::time::Instant;

/// Counters for the current observation window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Window generation, bumped on every rollover and state transition
    pub window_batch: u64,
    /// When the current window should be rotated (`None` = never)
    pub window_expiry: Option<Instant>,
    pub count_all: u64,
    pub count_success: u64,
    pub count_fail: u64,
    pub consecutive_success: u64,
    pub consecutive_fail: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an admitted call
    pub fn record_attempt(&mut self) {
        self.count_all += 1;
    }

    pub fn record_success(&mut self) {
        self.count_success += 1;
        self.consecutive_success += 1;
        self.consecutive_fail = 0;
    }

    pub fn record_failure(&mut self) {
        self.count_fail += 1;
        self.consecutive_fail += 1;
        self.consecutive_success = 0;
    }

    /// Zero every counter. `window_batch` and `window_expiry` are left alone.
    pub fn reset_counters(&mut self) {
        self.count_all = 0;
        self.count_success = 0;
        self.count_fail = 0;
        self.consecutive_success = 0;
        self.consecutive_fail = 0;
    }

    pub fn start_new_batch(&mut self) {
        self.window_batch += 1;
    }

    /// Fraction of attempts that failed, 0.0 when nothing was attempted
    pub fn failure_rate(&self) -> f64 {
        if self.count_all == 0 {
            0.0
        } else {
            self.count_fail as f64 / self.count_all as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaks_are_mutually_exclusive() {
        let mut m = Metrics::new();

        m.record_attempt();
        m.record_success();
        m.record_attempt();
        m.record_success();
        assert_eq!(m.consecutive_success, 2);
        assert_eq!(m.consecutive_fail, 0);

        m.record_attempt();
        m.record_failure();
        assert_eq!(m.consecutive_success, 0);
        assert_eq!(m.consecutive_fail, 1);

        assert_eq!(m.count_all, 3);
        assert_eq!(m.count_all, m.count_success + m.count_fail);
    }

    #[test]
    fn test_reset_keeps_batch() {
        let mut m = Metrics::new();
        m.start_new_batch();
        m.start_new_batch();
        m.record_attempt();
        m.record_failure();

        m.reset_counters();

        assert_eq!(m.window_batch, 2);
        assert_eq!(m.count_all, 0);
        assert_eq!(m.count_fail, 0);
        assert_eq!(m.consecutive_fail, 0);
    }

    #[test]
    fn test_failure_rate() {
        let mut m = Metrics::new();
        assert_eq!(m.failure_rate(), 0.0);

        for ok in [true, false, false, true] {
            m.record_attempt();
            if ok {
                m.record_success();
            } else {
                m.record_failure();
            }
        }
        assert!((m.failure_rate() - 0.5).abs() < f64::EPSILON);
    }
}
