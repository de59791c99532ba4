//! Error types for the adapter.

use thiserror::Error;

/// Result alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Errors surfaced by filesystem operations.
///
/// The first four variants translate to protocol status codes and keep the
/// session alive; `Backend` is reported to the client as a generic failure
/// while the detail goes to the log.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path (or its single symlink hop) is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rename target is already occupied.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Directory used where a file was expected, or vice versa.
    #[error("invalid operation on {0}")]
    InvalidOperation(String),

    /// Request the protocol cannot serve at all.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// An object-store call failed.
    #[error(transparent)]
    Backend(#[from] StoreError),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create an InvalidOperation error.
    pub fn invalid_operation(path: impl Into<String>) -> Self {
        Self::InvalidOperation(path.into())
    }
}

/// A failed call against the remote object store, with enough context to
/// log meaningfully.
#[derive(Debug, Error)]
#[error("object store {op} failed for {key:?}: {detail}")]
pub struct StoreError {
    pub op: &'static str,
    pub key: String,
    pub detail: String,
}

impl StoreError {
    pub fn new(op: &'static str, key: impl Into<String>, detail: impl ToString) -> Self {
        Self {
            op,
            key: key.into(),
            detail: detail.to_string(),
        }
    }
}
