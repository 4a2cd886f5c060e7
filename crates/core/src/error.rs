//! Errors reported by key stores

use thiserror::Error;

/// Failure of a key store primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The key does not exist
    #[error("key not found: {path}")]
    NotFound { path: String },

    /// The key was deleted while a handle to it was still open
    #[error("key has been marked for deletion")]
    KeyDeleted,

    /// The handle was opened without the access the operation needs
    #[error("access denied")]
    AccessDenied,

    /// The handle is closed, unknown, or the sentinel value
    #[error("invalid handle")]
    InvalidHandle,

    /// An argument was rejected
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Native call failed with a status code
    #[error("{op} failed with status {code}")]
    Os { op: &'static str, code: u32 },
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
