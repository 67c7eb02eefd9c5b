//! Error types for the permissions module.

use ezlock_store::StoreError;
use thiserror::Error;

/// Errors that can occur during permission operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The lock, grant or principal does not exist.
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

    /// Storage failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for PermsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => PermsError::NotFound(what),
            other => PermsError::Store(other),
        }
    }
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
