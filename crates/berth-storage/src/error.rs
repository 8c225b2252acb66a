//! Storage error types.

use thiserror::Error;

/// Errors that can occur during repository state operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested object does not exist in the store.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The requested reference does not exist.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// An object id could not be decoded.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// A reference is malformed or cannot be resolved.
    #[error("invalid ref: {0}")]
    InvalidRef(String),

    /// An object payload or header was malformed.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// A reference transaction found the repository in a different state
    /// than the one it was validated against.
    #[error("ref transaction conflict on {0}")]
    CommitConflict(String),

    /// A repository with this key already exists.
    #[error("repository already exists: {0}")]
    RepoExists(String),

    /// The requested repository does not exist.
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
