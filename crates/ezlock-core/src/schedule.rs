//! Grant time rules and the validity evaluator.
//!
//! A grant carries one of three time rules. Rule fields are kept exactly as
//! the issuer supplied them and only parsed at evaluation time, so a
//! malformed field can live in storage without ever being trusted: every
//! parse failure evaluates to "not valid".
//!
//! Evaluation is pure. It never touches storage and never fails; callers get
//! a plain `bool`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::clock::{parse_date, parse_minute, parse_time, truncate_to_minute};

/// Persisted type code for [`Schedule::Permanent`].
pub const CODE_PERMANENT: &str = "1";
/// Persisted type code for [`Schedule::OneTimeDeadline`].
pub const CODE_ONE_TIME_DEADLINE: &str = "2";
/// Persisted type code for [`Schedule::TimeWindow`].
pub const CODE_TIME_WINDOW: &str = "3";

/// The time rule of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Schedule {
    /// Valid until revoked.
    Permanent,

    /// Valid up to and including `deadline` (`YYYY-MM-DD HH:MM`, local).
    OneTimeDeadline { deadline: String },

    /// Valid on every day in `[start_date, end_date]`, during
    /// `[start_time, end_time]` (both bounds inclusive).
    #[serde(rename_all = "camelCase")]
    TimeWindow {
        start_date: String,
        end_date: String,
        start_time: String,
        end_time: String,
    },

    /// A type code this build does not understand. Never valid.
    Unrecognized { code: String },
}

/// Flat field layout shared by storage rows and issuer requests.
///
/// Fields irrelevant to a rule are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleFields {
    pub deadline: String,
    pub start_date: String,
    pub end_date: String,
    pub start_time: String,
    pub end_time: String,
}

struct Window {
    start_date: NaiveDate,
    end_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

impl Schedule {
    /// Build a rule from its persisted type code and flat fields.
    pub fn from_parts(code: &str, fields: ScheduleFields) -> Self {
        match code {
            CODE_PERMANENT => Schedule::Permanent,
            CODE_ONE_TIME_DEADLINE => Schedule::OneTimeDeadline {
                deadline: fields.deadline,
            },
            CODE_TIME_WINDOW => Schedule::TimeWindow {
                start_date: fields.start_date,
                end_date: fields.end_date,
                start_time: fields.start_time,
                end_time: fields.end_time,
            },
            other => Schedule::Unrecognized {
                code: other.to_string(),
            },
        }
    }

    /// The persisted type code.
    pub fn code(&self) -> &str {
        match self {
            Schedule::Permanent => CODE_PERMANENT,
            Schedule::OneTimeDeadline { .. } => CODE_ONE_TIME_DEADLINE,
            Schedule::TimeWindow { .. } => CODE_TIME_WINDOW,
            Schedule::Unrecognized { code } => code,
        }
    }

    /// Split into the persisted type code and flat fields.
    pub fn to_parts(&self) -> (String, ScheduleFields) {
        let fields = match self {
            Schedule::OneTimeDeadline { deadline } => ScheduleFields {
                deadline: deadline.clone(),
                ..ScheduleFields::default()
            },
            Schedule::TimeWindow {
                start_date,
                end_date,
                start_time,
                end_time,
            } => ScheduleFields {
                start_date: start_date.clone(),
                end_date: end_date.clone(),
                start_time: start_time.clone(),
                end_time: end_time.clone(),
                ..ScheduleFields::default()
            },
            Schedule::Permanent | Schedule::Unrecognized { .. } => ScheduleFields::default(),
        };
        (self.code().to_string(), fields)
    }

    /// Whether the rule holds at `now`.
    pub fn is_valid_at(&self, now: NaiveDateTime) -> bool {
        match self {
            Schedule::Permanent => true,
            Schedule::OneTimeDeadline { deadline } => match parse_minute(deadline) {
                Some(deadline) => now <= deadline,
                None => false,
            },
            Schedule::TimeWindow { .. } => match self.window() {
                Some(w) => {
                    let today = now.date();
                    let minute = truncate_to_minute(now.time());
                    w.start_date <= today
                        && today <= w.end_date
                        && w.start_time <= minute
                        && minute <= w.end_time
                }
                None => false,
            },
            Schedule::Unrecognized { .. } => false,
        }
    }

    /// Whether the rule can still hold at `now` or at some later instant.
    ///
    /// Used when a grant is issued: a rule that is malformed, whose deadline
    /// or window has already passed, or whose window is empty can never
    /// become valid and is rejected up front.
    pub fn is_satisfiable_from(&self, now: NaiveDateTime) -> bool {
        match self {
            Schedule::Permanent => true,
            Schedule::OneTimeDeadline { .. } => self.is_valid_at(now),
            Schedule::TimeWindow { .. } => match self.window() {
                Some(w) => {
                    if w.start_date > w.end_date || w.start_time > w.end_time {
                        return false;
                    }
                    let today = now.date();
                    let minute = truncate_to_minute(now.time());
                    today < w.end_date || (today == w.end_date && minute <= w.end_time)
                }
                None => false,
            },
            Schedule::Unrecognized { .. } => false,
        }
    }

    fn window(&self) -> Option<Window> {
        let Schedule::TimeWindow {
            start_date,
            end_date,
            start_time,
            end_time,
        } = self
        else {
            return None;
        };
        Some(Window {
            start_date: parse_date(start_date)?,
            end_date: parse_date(end_date)?,
            start_time: parse_time(start_time)?,
            end_time: parse_time(end_time)?,
        })
    }
}
