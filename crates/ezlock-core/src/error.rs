//! Error types for EZLock core.

use thiserror::Error;

/// Errors from the pure core: cipher and wire-grammar failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad key length, malformed base64, ragged ciphertext or bad padding.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// A single log entry could not be parsed. Never fatal to a batch.
    #[error("malformed record {line:?}: {reason}")]
    MalformedRecord { line: String, reason: String },

    /// A hex identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
