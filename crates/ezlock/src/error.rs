//! Error types for the EZLock service.

use ezlock_core::CoreError;
use ezlock_perms::PermsError;
use ezlock_store::StoreError;
use thiserror::Error;

/// Errors that can occur during EZLock operations.
#[derive(Debug, Error)]
pub enum EzlockError {
    /// The lock, grant, card or principal does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller lacks the entitlement or capability required.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The grant has already been redeemed.
    #[error("grant already redeemed: {0}")]
    AlreadyUsed(String),

    /// An issuer tried to redeem their own grant.
    #[error("issuer cannot redeem their own grant")]
    SelfRedemptionDenied,

    /// The schedule can never become valid.
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    /// A lock with the MAC, or a card with the number, already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Bad key, bad code buffer, or an undecryptable payload.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// An inbound record could not be parsed.
    #[error("malformed record {line:?}: {reason}")]
    MalformedRecord { line: String, reason: String },

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// Storage failure.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EzlockError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => EzlockError::NotFound(what),
            other => EzlockError::Store(other),
        }
    }
}

impl From<PermsError> for EzlockError {
    fn from(err: PermsError) -> Self {
        match err {
            PermsError::NotFound(what) => EzlockError::NotFound(what),
            PermsError::Unauthorized(why) => EzlockError::Unauthorized(why),
            PermsError::AlreadyUsed(token) => EzlockError::AlreadyUsed(token),
            PermsError::SelfRedemptionDenied => EzlockError::SelfRedemptionDenied,
            PermsError::InvalidTimeRange(why) => EzlockError::InvalidTimeRange(why),
            PermsError::Store(err) => EzlockError::from(err),
        }
    }
}

impl From<CoreError> for EzlockError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CryptoFailure(why) => EzlockError::CryptoFailure(why),
            CoreError::MalformedRecord { line, reason } => {
                EzlockError::MalformedRecord { line, reason }
            }
            CoreError::InvalidId(id) => EzlockError::NotFound(id),
        }
    }
}

/// Result type for EZLock operations.
pub type Result<T> = std::result::Result<T, EzlockError>;
