//! Grammar of the operation-log batches reported by lock hardware.
//!
//! A batch is a comma-separated list of entries. Each entry has exactly five
//! underscore-delimited fields:
//!
//! ```text
//! <opcode>_<YYYY-MM-DD HH:MM>_<method>_<info>_<0|1>
//! ```
//!
//! `method` says how the lock was operated (`0` card, `1` authenticated
//! command); `info` is the card number or principal id accordingly.
//! Entries are parsed independently so one bad entry never spoils the rest
//! of a batch.

use chrono::NaiveDateTime;

use crate::clock::parse_minute;
use crate::error::{CoreError, Result};

/// Operated with an access card; `info` is the card number.
pub const METHOD_CARD: &str = "0";
/// Operated with a command token; `info` is the principal id.
pub const METHOD_AUTHENTICATED: &str = "1";

const FIELD_COUNT: usize = 5;

/// One parsed log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub opcode: String,
    pub occurred_at: NaiveDateTime,
    pub method: String,
    pub info: String,
    pub success: bool,
    /// The whitespace-trimmed source entry.
    pub raw: String,
}

impl LogEntry {
    /// Whether `info` names a principal that must be resolved.
    pub fn requires_principal(&self) -> bool {
        self.method == METHOD_AUTHENTICATED
    }
}

/// Split a decrypted batch into its raw entries.
pub fn split_batch(plaintext: &str) -> impl Iterator<Item = &str> {
    plaintext.trim().split(',').map(str::trim)
}

/// Parse a single entry.
pub fn parse_entry(entry: &str) -> Result<LogEntry> {
    let raw = entry.trim();
    let fields: Vec<&str> = raw.split('_').map(str::trim).collect();

    if fields.len() != FIELD_COUNT {
        return Err(CoreError::MalformedRecord {
            line: raw.to_string(),
            reason: format!("expected {} fields, got {}", FIELD_COUNT, fields.len()),
        });
    }

    let occurred_at = parse_minute(fields[1]).ok_or_else(|| CoreError::MalformedRecord {
        line: raw.to_string(),
        reason: format!("unparseable timestamp {:?}", fields[1]),
    })?;

    Ok(LogEntry {
        opcode: fields[0].to_string(),
        occurred_at,
        method: fields[2].to_string(),
        info: fields[3].to_string(),
        success: fields[4] == "1",
        raw: raw.to_string(),
    })
}
