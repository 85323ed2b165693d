//! Embedded storage engine
//!
//! A single-file, transactional key-value store with named buckets.
//!
//! # Design Principles
//!
//! - One commit record per write-transaction, appended and fsynced
//! - One exclusive process-level lock per store file
//! - Checksum-verified replay on open; torn tails are truncated, corruption halts
//! - One writer at a time, any number of snapshot readers
//! - Commit publishes all of a transaction's mutations or none of them
//! - Compaction rewrites the log as one record of the live state

mod checksum;
mod engine;
mod errors;
mod log;
mod record;

pub use checksum::compute_checksum;
pub use engine::{BucketMap, CompactStats, Cursor, ReadTxn, Readable, Store, StoreStats, WriteTxn};
pub use errors::{Severity, StorageError, StorageErrorCode, StorageResult};
pub use log::{CommitLog, FileLog, MemoryLog};
pub use record::{CommitRecord, Op};
