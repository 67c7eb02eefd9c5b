//! Proptest generators for property-based testing.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;

use ezlock_core::{
    clock::{DATE_FORMAT, TIME_FORMAT},
    format_minute, Capabilities, LockId, LockSecret, PrincipalId, Schedule, ID_LEN,
};

/// Generate a random PrincipalId.
pub fn principal_id() -> impl Strategy<Value = PrincipalId> {
    any::<[u8; ID_LEN]>().prop_map(PrincipalId::from_bytes)
}

/// Generate a random LockId.
pub fn lock_id() -> impl Strategy<Value = LockId> {
    any::<[u8; ID_LEN]>().prop_map(LockId::from_bytes)
}

/// Generate a lock secret of a valid AES key length.
pub fn lock_secret() -> impl Strategy<Value = LockSecret> {
    prop_oneof![Just(16usize), Just(24), Just(32)]
        .prop_flat_map(|len| prop::collection::vec(any::<u8>(), len))
        .prop_map(LockSecret::from_bytes)
}

/// Generate an arbitrary capability set.
pub fn capabilities() -> impl Strategy<Value = Capabilities> {
    (any::<bool>(), any::<bool>(), any::<bool>())
        .prop_map(|(v, a, s)| Capabilities::new(v, a, s))
}

/// Generate a minute-precision instant between 2000 and roughly 2060.
pub fn instant() -> impl Strategy<Value = NaiveDateTime> {
    (0i64..(60 * 365 * 24 * 60)).prop_map(|minutes| epoch() + Duration::minutes(minutes))
}

/// Generate a well-formed schedule of any kind.
pub fn schedule() -> impl Strategy<Value = Schedule> {
    prop_oneof![
        Just(Schedule::Permanent),
        instant().prop_map(|t| Schedule::OneTimeDeadline {
            deadline: format_minute(t),
        }),
        (instant(), 0i64..400, 0u32..1440, 0u32..1440).prop_map(|(start, days, a, b)| {
            let end = start + Duration::days(days);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            Schedule::TimeWindow {
                start_date: start.format(DATE_FORMAT).to_string(),
                end_date: end.format(DATE_FORMAT).to_string(),
                start_time: minute_of_day(lo),
                end_time: minute_of_day(hi),
            }
        }),
    ]
}

/// Generate schedule field text that is frequently garbage.
pub fn schedule_field() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[0-9]{4}-[0-9]{2}-[0-9]{2}( [0-9]{2}:[0-9]{2})?",
        "[0-9]{2}:[0-9]{2}",
        ".{0,24}",
    ]
}

/// Generate a printable log entry field (no delimiters).
pub fn log_field() -> impl Strategy<Value = String> {
    "[A-Za-z0-9:]{1,16}"
}

/// Generate plaintext bytes of specified max length.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn minute_of_day(m: u32) -> String {
    NaiveDateTime::default()
        .checked_add_signed(Duration::minutes(i64::from(m)))
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "00:00".to_string())
}
