//! Error types for the walletsync-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Uses `thiserror` for ergonomic, zero-cost error definitions.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage primitives.
#[derive(Debug, Error)]
pub enum StoreError {
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested record was not found (or has expired).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A positional removal addressed an index outside the scope's list.
    #[error("invalid position {index} in scope `{scope}` (len {len})")]
    InvalidPosition {
        scope: String,
        index: usize,
        len: usize,
    },

    /// Configuration could not be parsed or is out of range.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// The supplied password does not match the stored one.
    #[error("password mismatch")]
    PasswordMismatch,

    /// A password operation requires a password that was never set.
    #[error("no password set")]
    NoPasswordSet,

    /// A cryptographic primitive failed (e.g. CSPRNG unavailable).
    #[error("crypto error: {reason}")]
    Crypto { reason: String },
}
