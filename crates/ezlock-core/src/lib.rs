//! # EZLock Core
//!
//! Pure primitives for EZLock: identifiers, entities, grant time rules, the
//! command cipher shared with lock hardware, and the hardware log grammar.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Schedule`] - A grant's time rule, with the validity evaluator
//! - [`Capabilities`] - Extra rights a grant confers (view log, add card, share)
//! - [`Lock`], [`Grant`], [`Card`], [`LogRecord`] - Persisted entities
//! - [`LockSecret`] - A lock's symmetric key; never serialized
//!
//! ## Wire Format
//!
//! Command tokens and hardware payloads are `base64(IV || AES-CBC(PKCS7(m)))`.
//! See [`crypto`].

pub mod capability;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod logline;
pub mod model;
pub mod schedule;
pub mod types;

pub use capability::Capabilities;
pub use clock::{format_minute, parse_minute, Clock, ManualClock, SystemClock};
pub use crypto::{CommandIv, BLOCK_SIZE};
pub use error::{CoreError, Result};
pub use logline::{parse_entry, split_batch, LogEntry};
pub use model::{Card, Grant, Lock, LockSecret, LockView, LogRecord, Principal};
pub use schedule::{Schedule, ScheduleFields};
pub use types::{CardId, GrantId, LockId, PrincipalId, ID_LEN};
