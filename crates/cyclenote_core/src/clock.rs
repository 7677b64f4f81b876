//! Wall-clock access for bookkeeping timestamps and "today".
//!
//! # Responsibility
//! - Keep every wall-clock read behind one injectable seam.
//!
//! # Invariants
//! - `now_epoch_ms` and `today` of one clock agree on the same instant.

use chrono::{DateTime, NaiveDate, Utc};

/// Source of the current instant.
pub trait Clock {
    /// Current instant in Unix epoch milliseconds.
    fn now_epoch_ms(&self) -> i64;

    /// Current calendar date.
    fn today(&self) -> NaiveDate {
        DateTime::<Utc>::from_timestamp_millis(self.now_epoch_ms())
            .map(|instant| instant.date_naive())
            .unwrap_or_default()
    }
}

/// Reads the system clock (UTC).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    epoch_ms: i64,
}

impl FixedClock {
    pub fn from_epoch_ms(epoch_ms: i64) -> Self {
        Self { epoch_ms }
    }

    /// Pins the clock to midnight UTC of `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        let epoch_ms = date
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc().timestamp_millis())
            .unwrap_or_default();
        Self { epoch_ms }
    }
}

impl Clock for FixedClock {
    fn now_epoch_ms(&self) -> i64 {
        self.epoch_ms
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_epoch_ms(&self) -> i64 {
        (**self).now_epoch_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, FixedClock};
    use chrono::NaiveDate;

    #[test]
    fn fixed_clock_today_matches_pinned_date() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 26).expect("valid date");
        let clock = FixedClock::at_date(date);
        assert_eq!(clock.today(), date);
        assert_eq!(clock.now_epoch_ms(), 1_708_905_600_000);
    }
}
