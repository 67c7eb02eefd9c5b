//! Persisted entities: locks, grants, cards, log records and principals.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::capability::Capabilities;
use crate::schedule::Schedule;
use crate::types::{CardId, GrantId, LockId, PrincipalId};

/// A lock's symmetric key, shared with the hardware at provisioning time.
///
/// Deliberately has no `Serialize` impl and a redacted `Debug`, so it cannot
/// leak into a response or a log line.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct LockSecret(Vec<u8>);

impl LockSecret {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for LockSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockSecret(<{} bytes redacted>)", self.0.len())
    }
}

/// A physical lock.
#[derive(Debug, Clone)]
pub struct Lock {
    pub id: LockId,
    /// Hardware MAC address; unique across all locks.
    pub mac: String,
    pub secret: LockSecret,
    pub owner: PrincipalId,
    /// False once the owner has deleted the lock.
    pub valid: bool,
    pub name: String,
    pub description: String,
    pub model: String,
    pub version: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Lock {
    /// Project into the client-facing view.
    pub fn view(&self, is_owner: bool) -> LockView {
        LockView {
            id: self.id,
            mac: self.mac.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            model: self.model.clone(),
            version: self.version.clone(),
            valid: self.valid,
            is_owner,
        }
    }
}

/// What a caller is allowed to see about a lock: no secret, no owner id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockView {
    pub id: LockId,
    pub mac: String,
    pub name: String,
    pub description: String,
    pub model: String,
    pub version: String,
    pub valid: bool,
    pub is_owner: bool,
}

/// A delegated, time-scoped permission on one lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub id: GrantId,
    pub issuer: PrincipalId,
    /// Unset until the grant is redeemed; immutable afterwards.
    pub recipient: Option<PrincipalId>,
    pub lock_id: LockId,
    pub schedule: Schedule,
    pub capabilities: Capabilities,
    /// Cached validity. Lazily flipped to false once the schedule lapses;
    /// never flipped back automatically.
    pub valid: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Grant {
    /// The out-of-band redemption token: the grant's own identity.
    pub fn token(&self) -> String {
        self.id.to_hex()
    }

    pub fn is_redeemed(&self) -> bool {
        self.recipient.is_some()
    }

    /// Evaluate the time rule at `now`, ignoring the cached flag.
    pub fn evaluate(&self, now: NaiveDateTime) -> bool {
        self.schedule.is_valid_at(now)
    }
}

/// An access card enrolled on a lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub lock_id: LockId,
    pub number: String,
    /// Principal who enrolled the card.
    pub added_by: PrincipalId,
    /// False once the card has been deleted from the lock.
    pub valid: bool,
    pub name: String,
    pub description: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One operation reported by a lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub lock_id: LockId,
    /// Only set for methods that require user attribution.
    pub principal: Option<PrincipalId>,
    pub method: String,
    pub success: bool,
    /// The trimmed source line; the record's identity.
    pub raw: String,
    pub occurred_at: NaiveDateTime,
}

/// An end user as known to the principal directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: PrincipalId,
    pub display_name: String,
}
