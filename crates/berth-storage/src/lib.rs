//! Repository state for Berth.
//!
//! This crate provides content-addressed storage for git objects
//! (blobs, trees, commits, tags), reference management with
//! transactional compare-and-swap updates, and a repository registry
//! with per-repository push locks.

mod error;
mod object;
mod refs;
mod store;

pub use error::StorageError;
pub use object::{GitObject, ObjectId, ObjectKind};
pub use refs::{RefEdit, RefStore, RefTransaction, Reference};
pub use store::{ObjectStore, RepoStore, Repository};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
