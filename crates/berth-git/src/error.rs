//! Git protocol error types.

use thiserror::Error;

/// Errors that can occur while serving a push.
///
/// Framing and pack errors are fatal for the session; per-ref
/// rejections are not errors and travel as `ng` status lines instead.
#[derive(Debug, Error)]
pub enum GitError {
    /// The pack container header is not a pack we can read.
    #[error("malformed pack header: {0}")]
    MalformedPackHeader(String),

    /// A pack entry declared more bytes than the stream holds.
    #[error("truncated object: {0}")]
    TruncatedObject(String),

    /// The trailing pack checksum does not match the consumed bytes.
    #[error("pack checksum mismatch")]
    ChecksumMismatch,

    /// A pkt-line frame is malformed.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// The client sent something the current protocol phase does not
    /// allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] berth_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
