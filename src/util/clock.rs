//! Wall-clock helpers and an injectable source of local time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Timelike;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Seconds as a duration. Negative and non-finite inputs become zero.
#[must_use]
pub fn duration_from_secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Source of the local hour of day used for time-of-day policy buckets.
pub trait Clock: Send + Sync {
    /// Current local hour in `0..24`.
    fn local_hour(&self) -> u32;
}

/// Clock backed by the host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_hour(&self) -> u32 {
        chrono::Local::now().hour()
    }
}

/// Clock pinned to a fixed hour. Used by tests and dry runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    hour: u32,
}

impl FixedClock {
    /// Create a clock that always reports `hour` (taken modulo 24).
    #[must_use]
    pub const fn new(hour: u32) -> Self {
        Self { hour: hour % 24 }
    }
}

impl Clock for FixedClock {
    fn local_hour(&self) -> u32 {
        self.hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_wraps_hour() {
        assert_eq!(FixedClock::new(26).local_hour(), 2);
        assert_eq!(FixedClock::new(14).local_hour(), 14);
    }

    #[test]
    fn system_clock_hour_in_range() {
        assert!(SystemClock.local_hour() < 24);
    }

    #[test]
    fn duration_from_secs_saturates() {
        assert_eq!(duration_from_secs(-3.0), Duration::ZERO);
        assert_eq!(duration_from_secs(f64::NAN), Duration::ZERO);
        assert_eq!(duration_from_secs(1.5), Duration::from_millis(1500));
    }

    #[test]
    fn now_ms_is_positive() {
        assert!(now_ms() > 0);
    }
}
