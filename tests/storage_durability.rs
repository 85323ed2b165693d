//! Storage Durability Tests
//!
//! Covers:
//! - Committed writes survive reopen
//! - A torn tail from an interrupted commit is truncated, earlier commits kept
//! - Checksum damage is reported as corruption, never skipped
//! - A second open of the same file is refused while the first is live
//! - Compaction drops dead values from disk and keeps the live state
//! - Rolled-back and failed transactions leave no trace on disk
//! - Readers keep a consistent snapshot while a writer commits

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use voiceboard::storage::{
    CommitRecord, MemoryLog, Op, Readable, StorageError, StorageErrorCode, StorageResult, Store,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn store_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("data").join("app.db")
}

fn open_with_users(path: &Path) -> Store {
    let store = Store::open(path).unwrap();
    store.ensure_buckets(&["users"]).unwrap();
    store
}

fn put(store: &Store, key: &str, value: &str) {
    store
        .update(|txn| txn.put("users", key.as_bytes(), value.as_bytes().to_vec()))
        .unwrap();
}

fn read(store: &Store, key: &str) -> Option<Vec<u8>> {
    store
        .begin_read()
        .get("users", key.as_bytes())
        .unwrap()
        .map(<[u8]>::to_vec)
}

// =============================================================================
// Durability
// =============================================================================

#[test]
fn test_committed_writes_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);

    {
        let store = open_with_users(&path);
        put(&store, "alice", "1");
        put(&store, "bob", "2");
        store.update(|txn| txn.delete("users", b"bob")).unwrap();
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(read(&store, "alice"), Some(b"1".to_vec()));
    assert_eq!(read(&store, "bob"), None);
    assert_eq!(store.sequence(), 4);
}

#[test]
fn test_multi_op_transaction_is_one_commit() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);

    {
        let store = open_with_users(&path);
        let before = store.sequence();
        store
            .update(|txn| {
                txn.put("users", b"a", b"1".to_vec())?;
                txn.put("users", b"b", b"2".to_vec())?;
                txn.put("users", b"c", b"3".to_vec())
            })
            .unwrap();
        assert_eq!(store.sequence(), before + 1);
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(store.begin_read().len("users").unwrap(), 3);
}

#[test]
fn test_rolled_back_transaction_never_reaches_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);

    {
        let store = open_with_users(&path);
        let size = fs::metadata(&path).unwrap().len();

        let result: StorageResult<()> = store.update(|txn| {
            txn.put("users", b"ghost", b"boo".to_vec())?;
            Err(StorageError::data_corruption("caller aborted"))
        });
        assert!(result.is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), size);
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(read(&store, "ghost"), None);
}

// =============================================================================
// Crash Recovery
// =============================================================================

#[test]
fn test_torn_tail_is_truncated_and_earlier_commits_kept() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);

    {
        let store = open_with_users(&path);
        put(&store, "alice", "1");
    }
    let good_len = fs::metadata(&path).unwrap().len();

    // Half of a commit record, as left by a crash mid-append
    let partial = CommitRecord::new(
        99,
        vec![Op::Put {
            bucket: "users".to_string(),
            key: b"bob".to_vec(),
            value: b"2".to_vec(),
        }],
    )
    .serialize()
    .unwrap();
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&partial[..partial.len() / 2]).unwrap();
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(read(&store, "alice"), Some(b"1".to_vec()));
    assert_eq!(read(&store, "bob"), None);
    assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

    // Store keeps working after repair
    put(&store, "carol", "3");
    drop(store);
    let store = Store::open(&path).unwrap();
    assert_eq!(read(&store, "carol"), Some(b"3".to_vec()));
}

#[test]
fn test_flipped_byte_is_corruption() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);

    {
        let store = open_with_users(&path);
        put(&store, "alice", "0123456789");
    }

    let mut contents = fs::read(&path).unwrap();
    let last = contents.len() - 6;
    contents[last] ^= 0xFF;
    fs::write(&path, contents).unwrap();

    let err = match Store::open(&path) {
        Ok(_) => panic!("corrupted store opened"),
        Err(e) => e,
    };
    assert_eq!(err.code(), StorageErrorCode::DataCorruption);
    assert!(err.is_fatal());
    assert!(err.details().unwrap().starts_with("byte_offset"));
}

#[test]
fn test_garbage_file_is_not_silently_accepted() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let mut junk = 64u32.to_le_bytes().to_vec();
    junk.extend(std::iter::repeat(0xAB).take(80));
    fs::write(&path, junk).unwrap();

    assert!(Store::open(&path).is_err());
}

#[test]
fn test_damaged_length_field_halts_instead_of_truncating() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);

    {
        let store = open_with_users(&path);
        for n in 0..5 {
            put(&store, &format!("user{}", n), "committed");
        }
    }
    let mut contents = fs::read(&path).unwrap();
    let size = contents.len() as u64;

    // High byte of the first record's length: claims far more than the file holds
    contents[3] = 0x7f;
    fs::write(&path, contents).unwrap();

    let err = match Store::open(&path) {
        Ok(_) => panic!("store with a damaged length opened"),
        Err(e) => e,
    };
    assert_eq!(err.code(), StorageErrorCode::DataCorruption);
    assert_eq!(fs::metadata(&path).unwrap().len(), size);
}

// =============================================================================
// Exclusive Access
// =============================================================================

#[test]
fn test_second_open_of_same_file_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);

    let first = open_with_users(&path);
    let err = match Store::open(&path) {
        Ok(_) => panic!("two handles opened the same store"),
        Err(e) => e,
    };
    assert_eq!(err.code(), StorageErrorCode::StoreLocked);
    assert!(!err.is_fatal());

    // The live handle is unaffected
    put(&first, "alice", "1");
    drop(first);

    let store = Store::open(&path).unwrap();
    assert_eq!(read(&store, "alice"), Some(b"1".to_vec()));
}

// =============================================================================
// Compaction
// =============================================================================

#[test]
fn test_compaction_drops_dead_values_and_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);

    {
        let store = open_with_users(&path);
        for n in 0..20 {
            put(&store, "alice", &format!("revision-{}", n));
        }
        put(&store, "bob", "purged-secret");
        store.update(|txn| txn.delete("users", b"bob")).unwrap();

        let before = fs::metadata(&path).unwrap().len();
        let stats = store.compact().unwrap();
        assert_eq!(stats.bytes_before, before);
        assert_eq!(stats.bytes_after, fs::metadata(&path).unwrap().len());
        assert!(stats.bytes_after < before);

        put(&store, "carol", "after-compaction");
    }

    let contents = fs::read(&path).unwrap();
    let haystack = String::from_utf8_lossy(&contents);
    assert!(!haystack.contains("purged-secret"));
    assert!(!haystack.contains("revision-0"));

    let store = Store::open(&path).unwrap();
    assert_eq!(read(&store, "alice"), Some(b"revision-19".to_vec()));
    assert_eq!(read(&store, "bob"), None);
    assert_eq!(read(&store, "carol"), Some(b"after-compaction".to_vec()));
    assert_eq!(store.sequence(), 24);
}

// =============================================================================
// Failure Injection
// =============================================================================

#[test]
fn test_failed_commit_publishes_nothing() {
    let fail = Arc::new(AtomicBool::new(false));
    let store = Store::with_log(Box::new(MemoryLog::failing_when(fail.clone()))).unwrap();
    store.ensure_buckets(&["users"]).unwrap();
    put(&store, "alice", "1");

    fail.store(true, Ordering::SeqCst);
    let result = store.update(|txn| {
        txn.put("users", b"alice", b"overwritten".to_vec())?;
        txn.put("users", b"bob", b"2".to_vec())
    });
    assert!(result.is_err());

    assert_eq!(read(&store, "alice"), Some(b"1".to_vec()));
    assert_eq!(read(&store, "bob"), None);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_reader_snapshot_unaffected_by_concurrent_writer() {
    let store = Store::in_memory();
    store.ensure_buckets(&["users"]).unwrap();
    put(&store, "counter", "0");

    let snapshot = store.begin_read();

    let writer = {
        let store = store.clone();
        thread::spawn(move || {
            for n in 1..=50 {
                put(&store, "counter", &n.to_string());
            }
        })
    };
    writer.join().unwrap();

    assert_eq!(snapshot.get("users", b"counter").unwrap(), Some(&b"0"[..]));
    assert_eq!(read(&store, "counter"), Some(b"50".to_vec()));
}

#[test]
fn test_concurrent_read_modify_write_loses_no_updates() {
    let store = Store::in_memory();
    store.ensure_buckets(&["users"]).unwrap();
    put(&store, "counter", "0");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    store
                        .update(|txn| {
                            let current: u32 = txn
                                .get("users", b"counter")?
                                .and_then(|v| std::str::from_utf8(v).ok())
                                .and_then(|s| s.parse().ok())
                                .unwrap_or(0);
                            txn.put("users", b"counter", (current + 1).to_string().into_bytes())
                        })
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(read(&store, "counter"), Some(b"200".to_vec()));
}
