//! Transactional bucket store
//!
//! Committed state lives in memory as an immutable [`Snapshot`] behind an
//! `Arc`. Readers clone the `Arc` and never block. A single mutex serializes
//! writers for the whole life of a [`WriteTxn`]; the writer works on a
//! copy-on-write clone and publishes it only after the commit record is
//! durable in the [`CommitLog`].

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use super::errors::{StorageError, StorageResult};
use super::log::{CommitLog, FileLog, MemoryLog};
use super::record::{CommitRecord, Op};

/// Ordered key space of one bucket.
pub type BucketMap = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Clone, Default)]
struct Snapshot {
    sequence: u64,
    buckets: BTreeMap<String, Arc<BucketMap>>,
}

impl Snapshot {
    fn bucket(&self, name: &str) -> StorageResult<&BucketMap> {
        self.buckets
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| StorageError::bucket_not_found(name))
    }

    fn bucket_mut(&mut self, name: &str) -> StorageResult<&mut BucketMap> {
        self.buckets
            .get_mut(name)
            .map(Arc::make_mut)
            .ok_or_else(|| StorageError::bucket_not_found(name))
    }

    /// Applies a replayed op. Returns whether it changed anything.
    fn apply(&mut self, op: &Op) -> StorageResult<bool> {
        match op {
            Op::CreateBucket { bucket } => {
                if self.buckets.contains_key(bucket) {
                    return Ok(false);
                }
                self.buckets.insert(bucket.clone(), Arc::default());
                Ok(true)
            }
            Op::Put { bucket, key, value } => {
                self.bucket_mut(bucket)?.insert(key.clone(), value.clone());
                Ok(true)
            }
            Op::Delete { bucket, key } => Ok(self.bucket_mut(bucket)?.remove(key).is_some()),
        }
    }
}

struct Inner {
    committed: RwLock<Arc<Snapshot>>,
    writer: Mutex<Box<dyn CommitLog>>,
    location: String,
}

/// Handle to an open store. Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

/// Point-in-time summary of a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Sequence number of the last commit (0 for a fresh store)
    pub sequence: u64,
    /// Bucket names with their key counts, in name order
    pub buckets: Vec<(String, usize)>,
}

/// Outcome of [`Store::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    /// Sequence the rewritten log starts from
    pub sequence: u64,
    /// Log size before the rewrite
    pub bytes_before: u64,
    /// Log size after the rewrite
    pub bytes_after: u64,
}

impl Store {
    /// Opens (or creates) a single-file store at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::with_log(Box::new(FileLog::open(path)?))
    }

    /// Creates a store that lives only in memory.
    pub fn in_memory() -> Self {
        Self::from_parts(Box::new(MemoryLog::new()), Snapshot::default())
    }

    /// Opens a store over an arbitrary commit log, replaying its records.
    pub fn with_log(mut log: Box<dyn CommitLog>) -> StorageResult<Self> {
        let records = log.replay()?;

        let mut snapshot = Snapshot::default();
        for record in &records {
            for op in &record.ops {
                snapshot.apply(op).map_err(|e| {
                    StorageError::data_corruption(format!(
                        "Commit {} cannot be replayed: {}",
                        record.sequence,
                        e.message()
                    ))
                })?;
            }
            snapshot.sequence = record.sequence;
        }

        tracing::info!(
            location = %log.location(),
            sequence = snapshot.sequence,
            commits = records.len(),
            buckets = snapshot.buckets.len(),
            "store opened"
        );

        Ok(Self::from_parts(log, snapshot))
    }

    fn from_parts(log: Box<dyn CommitLog>, snapshot: Snapshot) -> Self {
        let location = log.location();
        Self {
            inner: Arc::new(Inner {
                committed: RwLock::new(Arc::new(snapshot)),
                writer: Mutex::new(log),
                location,
            }),
        }
    }

    /// Where the store keeps its bytes.
    pub fn location(&self) -> &str {
        &self.inner.location
    }

    /// Starts a read-transaction over the latest committed state.
    pub fn begin_read(&self) -> ReadTxn {
        ReadTxn {
            snapshot: Arc::clone(&self.inner.committed.read()),
        }
    }

    /// Starts a write-transaction, blocking while another writer is active.
    pub fn begin_write(&self) -> WriteTxn<'_> {
        let log = self.inner.writer.lock();
        let working = Snapshot::clone(&self.inner.committed.read());
        WriteTxn {
            store: &self.inner,
            log,
            working,
            ops: Vec::new(),
        }
    }

    /// Runs `f` inside a read-transaction.
    pub fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTxn) -> Result<T, E>,
    {
        let txn = self.begin_read();
        f(&txn)
    }

    /// Runs `f` inside a write-transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back when it returns `Err` or
    /// panics. The writer lock is released on every path.
    pub fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut txn = self.begin_write();
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.rollback();
                Err(e)
            }
        }
    }

    /// Creates every named bucket that does not exist yet, in one commit.
    pub fn ensure_buckets<S: AsRef<str>>(&self, names: &[S]) -> StorageResult<()> {
        self.update(|txn| {
            for name in names {
                txn.create_bucket_if_absent(name.as_ref());
            }
            Ok(())
        })
    }

    /// Rewrites the commit log as a single record holding the current state.
    ///
    /// Overwritten and deleted values are dropped from disk. Holds the writer
    /// lock throughout, so no commit can interleave; readers are unaffected.
    pub fn compact(&self) -> StorageResult<CompactStats> {
        let mut log = self.inner.writer.lock();
        let snapshot = Arc::clone(&self.inner.committed.read());
        let bytes_before = log.size();

        let mut ops = Vec::new();
        for (name, bucket) in &snapshot.buckets {
            ops.push(Op::CreateBucket {
                bucket: name.clone(),
            });
            ops.extend(bucket.iter().map(|(key, value)| Op::Put {
                bucket: name.clone(),
                key: key.clone(),
                value: value.clone(),
            }));
        }
        let base = CommitRecord::new(snapshot.sequence, ops);

        if let Err(e) = log.compact(&base) {
            tracing::error!(location = %log.location(), error = %e, "compaction failed");
            return Err(e);
        }

        let stats = CompactStats {
            sequence: snapshot.sequence,
            bytes_before,
            bytes_after: log.size(),
        };
        tracing::info!(
            location = %log.location(),
            sequence = stats.sequence,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "commit log compacted"
        );
        Ok(stats)
    }

    /// Sequence number of the last commit.
    pub fn sequence(&self) -> u64 {
        self.inner.committed.read().sequence
    }

    /// Bucket names and sizes as of the latest commit.
    pub fn stats(&self) -> StoreStats {
        let snapshot = Arc::clone(&self.inner.committed.read());
        StoreStats {
            sequence: snapshot.sequence,
            buckets: snapshot
                .buckets
                .iter()
                .map(|(name, bucket)| (name.clone(), bucket.len()))
                .collect(),
        }
    }
}

/// Read access shared by both transaction kinds.
pub trait Readable {
    /// Returns the key space of `bucket` as seen by this transaction.
    fn bucket_map(&self, bucket: &str) -> StorageResult<&BucketMap>;

    /// Returns whether `bucket` exists in this transaction's view.
    fn has_bucket(&self, bucket: &str) -> bool;

    /// Reads the value stored at `key`, if any.
    fn get(&self, bucket: &str, key: &[u8]) -> StorageResult<Option<&[u8]>> {
        Ok(self.bucket_map(bucket)?.get(key).map(Vec::as_slice))
    }

    /// Ordered cursor over the whole bucket.
    fn cursor(&self, bucket: &str) -> StorageResult<Cursor<'_>> {
        Ok(Cursor::new(self.bucket_map(bucket)?))
    }

    /// Number of keys in the bucket.
    fn len(&self, bucket: &str) -> StorageResult<usize> {
        Ok(self.bucket_map(bucket)?.len())
    }
}

/// Ordered cursor over one bucket, in key order.
///
/// `first` rewinds; iteration continues from the last returned entry.
pub struct Cursor<'t> {
    map: &'t BucketMap,
    iter: btree_map::Iter<'t, Vec<u8>, Vec<u8>>,
}

impl<'t> Cursor<'t> {
    fn new(map: &'t BucketMap) -> Self {
        Self {
            map,
            iter: map.iter(),
        }
    }

    /// Rewinds to the first entry and returns it.
    pub fn first(&mut self) -> Option<(&'t [u8], &'t [u8])> {
        self.iter = self.map.iter();
        self.next()
    }
}

impl<'t> Iterator for Cursor<'t> {
    type Item = (&'t [u8], &'t [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.iter
            .next()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

/// Consistent, non-blocking view of one committed state.
pub struct ReadTxn {
    snapshot: Arc<Snapshot>,
}

impl ReadTxn {
    /// Sequence number of the commit this view observes.
    pub fn sequence(&self) -> u64 {
        self.snapshot.sequence
    }
}

impl Readable for ReadTxn {
    fn bucket_map(&self, bucket: &str) -> StorageResult<&BucketMap> {
        self.snapshot.bucket(bucket)
    }

    fn has_bucket(&self, bucket: &str) -> bool {
        self.snapshot.buckets.contains_key(bucket)
    }
}

/// Exclusive write-transaction.
///
/// Mutations are visible to this transaction immediately and to everyone
/// else only after [`WriteTxn::commit`]. Dropping without commit rolls back.
pub struct WriteTxn<'s> {
    store: &'s Inner,
    log: MutexGuard<'s, Box<dyn CommitLog>>,
    working: Snapshot,
    ops: Vec<Op>,
}

impl WriteTxn<'_> {
    /// Creates `bucket` unless it already exists.
    pub fn create_bucket_if_absent(&mut self, bucket: &str) {
        let op = Op::CreateBucket {
            bucket: bucket.to_string(),
        };
        if !self.working.buckets.contains_key(bucket) {
            self.working.buckets.insert(bucket.to_string(), Arc::default());
            self.ops.push(op);
        }
    }

    /// Inserts or overwrites `key`.
    pub fn put(&mut self, bucket: &str, key: &[u8], value: Vec<u8>) -> StorageResult<()> {
        self.working
            .bucket_mut(bucket)?
            .insert(key.to_vec(), value.clone());
        self.ops.push(Op::Put {
            bucket: bucket.to_string(),
            key: key.to_vec(),
            value,
        });
        Ok(())
    }

    /// Removes `key`. Removing an absent key is a no-op.
    pub fn delete(&mut self, bucket: &str, key: &[u8]) -> StorageResult<()> {
        if self.working.bucket_mut(bucket)?.remove(key).is_some() {
            self.ops.push(Op::Delete {
                bucket: bucket.to_string(),
                key: key.to_vec(),
            });
        }
        Ok(())
    }

    /// Number of mutations pending in this transaction.
    pub fn pending_ops(&self) -> usize {
        self.ops.len()
    }

    /// Makes all mutations durable and visible, returning the commit sequence.
    ///
    /// On failure nothing is published and the log is left as it was.
    pub fn commit(self) -> StorageResult<u64> {
        let WriteTxn {
            store,
            mut log,
            mut working,
            ops,
        } = self;

        if ops.is_empty() {
            return Ok(working.sequence);
        }

        let sequence = working.sequence + 1;
        let op_count = ops.len();
        let record = CommitRecord::new(sequence, ops);

        if let Err(e) = log.append(&record) {
            tracing::error!(sequence, error = %e, "commit failed, transaction rolled back");
            return Err(e);
        }

        working.sequence = sequence;
        *store.committed.write() = Arc::new(working);
        tracing::trace!(sequence, ops = op_count, "commit published");

        Ok(sequence)
    }

    /// Discards all mutations.
    pub fn rollback(self) {}
}

impl Readable for WriteTxn<'_> {
    fn bucket_map(&self, bucket: &str) -> StorageResult<&BucketMap> {
        self.working.bucket(bucket)
    }

    fn has_bucket(&self, bucket: &str) -> bool {
        self.working.buckets.contains_key(bucket)
    }
}
