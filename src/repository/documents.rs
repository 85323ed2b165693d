//! Typed document access inside a single engine transaction.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::bucket::Bucket;
use super::codec::{decode, encode};
use super::errors::{RepositoryError, RepositoryResult};
use crate::storage::{ReadTxn, Readable, WriteTxn};

/// Typed reads over any transaction.
///
/// Scans walk the bucket in key order and decode every value they visit;
/// a value that fails to decode aborts the scan.
pub trait Documents {
    /// The underlying engine transaction.
    fn raw(&self) -> &dyn Readable;

    /// Reads `key`, or `None` when absent.
    fn get_opt<T: DeserializeOwned>(&self, bucket: Bucket, key: &str) -> RepositoryResult<Option<T>> {
        match self.raw().get(bucket.name(), key.as_bytes())? {
            Some(bytes) => decode(bucket, key.as_bytes(), bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Reads `key`. Absent and undecodable values are both `NotFound`.
    fn get<T: DeserializeOwned>(&self, bucket: Bucket, key: &str) -> RepositoryResult<T> {
        match self.get_opt(bucket, key) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(RepositoryError::not_found(bucket, key)),
            Err(RepositoryError::Codec { reason, .. }) => {
                tracing::warn!(%bucket, key, %reason, "stored record failed to decode");
                Err(RepositoryError::not_found(bucket, key))
            }
            Err(e) => Err(e),
        }
    }

    /// Returns whether `key` is present.
    fn exists(&self, bucket: Bucket, key: &str) -> RepositoryResult<bool> {
        Ok(self.raw().get(bucket.name(), key.as_bytes())?.is_some())
    }

    /// Every record in the bucket, in key order.
    fn get_all<T: DeserializeOwned>(&self, bucket: Bucket) -> RepositoryResult<Vec<T>> {
        self.raw()
            .cursor(bucket.name())?
            .map(|(key, value)| decode(bucket, key, value))
            .collect()
    }

    /// First record, in key order, for which `predicate` holds.
    fn find_one<T, P>(&self, bucket: Bucket, mut predicate: P) -> RepositoryResult<T>
    where
        T: DeserializeOwned,
        P: FnMut(&T) -> bool,
    {
        for (key, value) in self.raw().cursor(bucket.name())? {
            let record: T = decode(bucket, key, value)?;
            if predicate(&record) {
                return Ok(record);
            }
        }
        Err(RepositoryError::not_found(bucket, "<predicate>"))
    }

    /// Every record for which `predicate` holds, in key order.
    fn find_all<T, P>(&self, bucket: Bucket, mut predicate: P) -> RepositoryResult<Vec<T>>
    where
        T: DeserializeOwned,
        P: FnMut(&T) -> bool,
    {
        let mut matches = Vec::new();
        for (key, value) in self.raw().cursor(bucket.name())? {
            let record: T = decode(bucket, key, value)?;
            if predicate(&record) {
                matches.push(record);
            }
        }
        Ok(matches)
    }

    /// Number of records in the bucket.
    fn count(&self, bucket: Bucket) -> RepositoryResult<usize> {
        Ok(self.raw().len(bucket.name())?)
    }

    /// Number of records for which `predicate` holds.
    fn count_where<T, P>(&self, bucket: Bucket, mut predicate: P) -> RepositoryResult<usize>
    where
        T: DeserializeOwned,
        P: FnMut(&T) -> bool,
    {
        let mut count = 0;
        for (key, value) in self.raw().cursor(bucket.name())? {
            let record: T = decode(bucket, key, value)?;
            if predicate(&record) {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Typed view over a read-transaction.
pub struct DocView<'t> {
    txn: &'t ReadTxn,
}

impl<'t> DocView<'t> {
    pub(crate) fn new(txn: &'t ReadTxn) -> Self {
        Self { txn }
    }
}

impl Documents for DocView<'_> {
    fn raw(&self) -> &dyn Readable {
        self.txn
    }
}

/// Typed access to a write-transaction.
///
/// Reads observe this transaction's own pending writes.
pub struct DocTxn<'t, 's> {
    txn: &'t mut WriteTxn<'s>,
}

impl<'t, 's> DocTxn<'t, 's> {
    pub(crate) fn new(txn: &'t mut WriteTxn<'s>) -> Self {
        Self { txn }
    }

    /// Inserts or overwrites `key`.
    pub fn put<T: Serialize>(&mut self, bucket: Bucket, key: &str, record: &T) -> RepositoryResult<()> {
        let bytes = encode(bucket, key, record)?;
        self.txn.put(bucket.name(), key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Removes `key`; absent keys are a no-op.
    pub fn delete(&mut self, bucket: Bucket, key: &str) -> RepositoryResult<()> {
        self.txn.delete(bucket.name(), key.as_bytes())?;
        Ok(())
    }
}

impl Documents for DocTxn<'_, '_> {
    fn raw(&self) -> &dyn Readable {
        &*self.txn
    }
}
