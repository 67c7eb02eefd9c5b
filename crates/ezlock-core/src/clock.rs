//! Wall-clock access and the minute-precision timestamp grammar.
//!
//! Grant schedules, command plaintexts and hardware log lines all use local
//! naive date-times with minute precision (`YYYY-MM-DD HH:MM`). Time is read
//! through the [`Clock`] trait so that evaluation stays deterministic in
//! tests.

use std::sync::RwLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// `YYYY-MM-DD HH:MM`
pub const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";
/// `YYYY-MM-DD`
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// `HH:MM`
pub const TIME_FORMAT: &str = "%H:%M";

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The host's local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now: NaiveDateTime) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parse a `YYYY-MM-DD HH:MM` timestamp.
pub fn parse_minute(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, MINUTE_FORMAT).ok()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// Parse an `HH:MM` time of day.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT).ok()
}

/// Render as `YYYY-MM-DD HH:MM`.
pub fn format_minute(t: NaiveDateTime) -> String {
    t.format(MINUTE_FORMAT).to_string()
}

/// Drop seconds and sub-second precision from a time of day.
pub fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}
