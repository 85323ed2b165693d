//! Document store: one engine transaction per call.
//!
//! Lookups beyond the primary key are linear scans. That is acceptable only
//! for the modest record counts this store targets; a larger deployment needs
//! a secondary index (e.g. email -> id) maintained inside the same
//! write-transactions as the records it points at.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::bucket::Bucket;
use super::documents::{DocTxn, DocView, Documents};
use super::errors::{RepositoryError, RepositoryResult};
use crate::storage::Store;

/// Typed CRUD over the storage engine.
///
/// Every method is its own transaction. Read-modify-write sequences must go
/// through [`DocumentStore::update`] or [`DocumentStore::modify`] so the read
/// and the write share one write-transaction.
#[derive(Clone)]
pub struct DocumentStore {
    store: Store,
}

impl DocumentStore {
    /// Wrap an engine handle, creating every known bucket.
    pub fn new(store: Store) -> RepositoryResult<Self> {
        store.ensure_buckets(&Bucket::ALL)?;
        Ok(Self { store })
    }

    /// Open the store file at `path`.
    pub fn open(path: &Path) -> RepositoryResult<Self> {
        Self::new(Store::open(path)?)
    }

    /// Ephemeral store for tests and tooling.
    pub fn in_memory() -> RepositoryResult<Self> {
        Self::new(Store::in_memory())
    }

    /// The underlying engine handle.
    pub fn engine(&self) -> &Store {
        &self.store
    }

    /// Run `f` against one consistent snapshot.
    pub fn view<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&DocView<'_>) -> Result<R, E>,
    {
        self.store.view(|txn| f(&DocView::new(txn)))
    }

    /// Run `f` inside one write-transaction.
    ///
    /// Commits when `f` returns `Ok`. Rolls back when it returns `Err` or
    /// panics; the writer is released on every path. `f` may fail with any
    /// error that repository failures convert into.
    pub fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(&mut DocTxn<'_, '_>) -> Result<R, E>,
    {
        let mut txn = self.store.begin_write();
        let outcome = f(&mut DocTxn::new(&mut txn));
        match outcome {
            Ok(value) => {
                txn.commit().map_err(RepositoryError::from)?;
                Ok(value)
            }
            Err(e) => {
                txn.rollback();
                Err(e)
            }
        }
    }

    /// Load `key`, let `f` change it, and store it back in one write-transaction.
    pub fn modify<T, R, F>(&self, bucket: Bucket, key: &str, f: F) -> RepositoryResult<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> RepositoryResult<R>,
    {
        self.update(|txn| {
            let mut record: T = txn.get(bucket, key)?;
            let result = f(&mut record)?;
            txn.put(bucket, key, &record)?;
            Ok(result)
        })
    }

    /// Upsert `record` at `key`.
    pub fn put<T: Serialize>(&self, bucket: Bucket, key: &str, record: &T) -> RepositoryResult<()> {
        self.update(|txn| txn.put(bucket, key, record))
    }

    /// Read `key`; `NotFound` when absent or undecodable.
    pub fn get<T: DeserializeOwned>(&self, bucket: Bucket, key: &str) -> RepositoryResult<T> {
        self.view(|v| v.get(bucket, key))
    }

    /// Returns whether `key` is present.
    pub fn exists(&self, bucket: Bucket, key: &str) -> RepositoryResult<bool> {
        self.view(|v| v.exists(bucket, key))
    }

    /// Every record in key order; fails if any record fails to decode.
    pub fn get_all<T: DeserializeOwned>(&self, bucket: Bucket) -> RepositoryResult<Vec<T>> {
        self.view(|v| v.get_all(bucket))
    }

    /// First record in key order matching `predicate`.
    pub fn find_one<T, P>(&self, bucket: Bucket, predicate: P) -> RepositoryResult<T>
    where
        T: DeserializeOwned,
        P: FnMut(&T) -> bool,
    {
        self.view(|v| v.find_one(bucket, predicate))
    }

    /// Every record matching `predicate`, in key order.
    pub fn find_all<T, P>(&self, bucket: Bucket, predicate: P) -> RepositoryResult<Vec<T>>
    where
        T: DeserializeOwned,
        P: FnMut(&T) -> bool,
    {
        self.view(|v| v.find_all(bucket, predicate))
    }

    /// Number of records in the bucket.
    pub fn count(&self, bucket: Bucket) -> RepositoryResult<usize> {
        self.view(|v| v.count(bucket))
    }

    /// Number of records matching `predicate`.
    pub fn count_where<T, P>(&self, bucket: Bucket, predicate: P) -> RepositoryResult<usize>
    where
        T: DeserializeOwned,
        P: FnMut(&T) -> bool,
    {
        self.view(|v| v.count_where(bucket, predicate))
    }

    /// Remove `key`; absent keys are not an error.
    pub fn delete(&self, bucket: Bucket, key: &str) -> RepositoryResult<()> {
        self.update(|txn| txn.delete(bucket, key))
    }
}
