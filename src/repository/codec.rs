//! Canonical record encoding
//!
//! Records are stored as field-named JSON so the file stays inspectable and
//! tolerant of added optional fields.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::bucket::Bucket;
use super::errors::{RepositoryError, RepositoryResult};

/// Encode a record for storage under `bucket`/`key`.
pub fn encode<T: Serialize>(bucket: Bucket, key: &str, record: &T) -> RepositoryResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| RepositoryError::Codec {
        bucket,
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Decode a stored value read from `bucket`/`key`.
pub fn decode<T: DeserializeOwned>(bucket: Bucket, key: &[u8], bytes: &[u8]) -> RepositoryResult<T> {
    serde_json::from_slice(bytes).map_err(|e| RepositoryError::Codec {
        bucket,
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}
