//! Repository errors
//!
//! Storage failures pass through unchanged; everything else is expressed in
//! terms of buckets and keys.

use thiserror::Error;

use super::bucket::Bucket;
use crate::storage::StorageError;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Document repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Key absent, or its value could not be decoded on a point lookup
    #[error("{bucket}/{key} not found")]
    NotFound { bucket: Bucket, key: String },

    /// A uniqueness rule was violated by the caller's write
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored value could not be decoded (or a record could not be encoded)
    #[error("Cannot decode {bucket}/{key}: {reason}")]
    Codec {
        bucket: Bucket,
        key: String,
        reason: String,
    },

    /// Engine I/O or transaction failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RepositoryError {
    /// Create a not-found error for `bucket`/`key`
    pub fn not_found(bucket: Bucket, key: impl Into<String>) -> Self {
        RepositoryError::NotFound {
            bucket,
            key: key.into(),
        }
    }

    /// Returns whether this is a `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}
