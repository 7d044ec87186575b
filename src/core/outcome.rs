//! Rolling success/failure window fed back into load policy.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug)]
struct Window {
    flags: VecDeque<bool>,
    total_success: u64,
    total_error: u64,
}

/// Fixed-size sliding window of task outcomes.
///
/// Rates are computed over the window only; lifetime totals are kept
/// separately. An empty window reports a success rate of 1.0.
#[derive(Debug)]
pub struct RollingOutcomeCounter {
    inner: Mutex<Window>,
    capacity: usize,
}

/// Point-in-time view of a [`RollingOutcomeCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutcomeSnapshot {
    /// Entries currently in the window.
    pub window_len: usize,
    /// Success rate over the window.
    pub success_rate: f64,
    /// Error rate over the window.
    pub error_rate: f64,
    /// Lifetime successes.
    pub total_success: u64,
    /// Lifetime errors.
    pub total_error: u64,
}

impl RollingOutcomeCounter {
    /// Create a counter with the given window size (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Window {
                flags: VecDeque::with_capacity(capacity),
                total_success: 0,
                total_error: 0,
            }),
            capacity,
        }
    }

    fn push(&self, success: bool) {
        let mut w = self.inner.lock();
        if w.flags.len() >= self.capacity {
            w.flags.pop_front();
        }
        w.flags.push_back(success);
        if success {
            w.total_success += 1;
        } else {
            w.total_error += 1;
        }
    }

    /// Record a successful outcome.
    pub fn report_success(&self) {
        self.push(true);
    }

    /// Record a failed outcome.
    pub fn report_error(&self) {
        self.push(false);
    }

    /// Fraction of successes in the window.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        self.snapshot().success_rate
    }

    /// Fraction of failures in the window.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        self.snapshot().error_rate
    }

    /// Entries currently in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().flags.len()
    }

    /// True when nothing has been reported yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().flags.is_empty()
    }

    /// Window size.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Consistent view of rates and totals.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> OutcomeSnapshot {
        let w = self.inner.lock();
        let len = w.flags.len();
        let (success_rate, error_rate) = if len == 0 {
            (1.0, 0.0)
        } else {
            let successes = w.flags.iter().filter(|s| **s).count();
            let rate = successes as f64 / len as f64;
            (rate, 1.0 - rate)
        };
        OutcomeSnapshot {
            window_len: len,
            success_rate,
            error_rate,
            total_success: w.total_success,
            total_error: w.total_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_counter_is_optimistic() {
        let c = RollingOutcomeCounter::new(10);
        assert!(c.is_empty());
        assert!((c.success_rate() - 1.0).abs() < f64::EPSILON);
        assert!(c.error_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn rates_follow_window() {
        let c = RollingOutcomeCounter::new(4);
        c.report_error();
        c.report_error();
        for _ in 0..4 {
            c.report_success();
        }
        let snap = c.snapshot();
        assert_eq!(snap.window_len, 4);
        assert!((snap.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(snap.total_error, 2);
        assert_eq!(snap.total_success, 4);
    }
}
