//! Commit log backends
//!
//! The engine keeps its committed state in memory and makes it durable by
//! appending one [`CommitRecord`] per write-transaction to a [`CommitLog`].
//! Backends are opaque record sinks; the engine owns record interpretation.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fs2::FileExt;

use super::errors::{StorageError, StorageResult};
use super::record::CommitRecord;

/// Durable, append-only sink for commit records.
///
/// # Contract
///
/// - `replay` returns every record previously appended, in append order
/// - `append` either makes the record durable or leaves the log unchanged
/// - `compact` atomically replaces the whole log with `base`; on failure the
///   previous log is still in place
pub trait CommitLog: Send {
    /// Reads back all committed records.
    fn replay(&mut self) -> StorageResult<Vec<CommitRecord>>;

    /// Appends a record and syncs it to durable storage.
    fn append(&mut self, record: &CommitRecord) -> StorageResult<()>;

    /// Replaces every record with `base`, which must describe the full state.
    fn compact(&mut self, base: &CommitRecord) -> StorageResult<()>;

    /// Bytes currently held by the log.
    fn size(&self) -> u64;

    /// Human-readable location, used in log lines.
    fn location(&self) -> String;
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn encode(record: &CommitRecord) -> StorageResult<Vec<u8>> {
    record.serialize().map_err(|e| {
        StorageError::commit_failed(format!("Cannot encode commit {}", record.sequence), e)
    })
}

/// Single-file commit log with fsync on every append.
///
/// The file is guarded by an exclusive advisory lock on `<path>.lock`, held
/// for the life of the log. A second open of the same path fails with
/// `StoreLocked` instead of interleaving appends.
pub struct FileLog {
    path: PathBuf,
    file: File,
    len: u64,
    _lock: File,
}

impl FileLog {
    /// Opens or creates the log file, creating parent directories if needed.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StorageError::io_error(
                        format!("Failed to create data directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let lock_path = sibling(path, ".lock");
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                StorageError::io_error(
                    format!("Failed to open lock file: {}", lock_path.display()),
                    e,
                )
            })?;

        if FileExt::try_lock_exclusive(&lock).is_err() {
            tracing::warn!(path = %path.display(), "store is locked by another handle");
            return Err(StorageError::store_locked(path));
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                StorageError::io_error(
                    format!("Failed to open store file: {}", path.display()),
                    e,
                )
            })?;

        let len = file
            .metadata()
            .map_err(|e| StorageError::io_error("Failed to read file metadata", e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            _lock: lock,
        })
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current file length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns whether nothing has been committed yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn truncate_to(&mut self, offset: u64) -> std::io::Result<()> {
        self.file.set_len(offset)?;
        self.file.sync_all()?;
        self.len = offset;
        Ok(())
    }

    fn repair_torn_tail(&mut self, offset: usize, total: usize) -> StorageResult<()> {
        tracing::warn!(
            path = %self.path.display(),
            offset,
            discarded_bytes = total - offset,
            "truncating torn commit record"
        );
        self.truncate_to(offset as u64)
            .map_err(|e| StorageError::io_error("Failed to truncate torn commit record", e))
    }

    fn sync_parent_dir(&self) -> std::io::Result<()> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
            _ => Ok(()),
        }
    }
}

impl CommitLog for FileLog {
    fn replay(&mut self) -> StorageResult<Vec<CommitRecord>> {
        let mut contents = Vec::with_capacity(self.len as usize);
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.read_to_end(&mut contents))
            .map_err(|e| StorageError::io_error("Failed to read store file", e))?;

        let mut records = Vec::new();
        let mut offset = 0usize;

        while offset < contents.len() {
            match CommitRecord::deserialize(&contents[offset..]) {
                Ok((record, consumed)) => {
                    if let Some(last) = records.last().map(|r: &CommitRecord| r.sequence) {
                        if record.sequence <= last {
                            return Err(StorageError::corruption_at_offset(
                                offset as u64,
                                format!(
                                    "Sequence {} does not follow {}",
                                    record.sequence, last
                                ),
                            ));
                        }
                    }
                    records.push(record);
                    offset += consumed;
                }
                // Interrupted commit: the tail was never acknowledged.
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.repair_torn_tail(offset, contents.len())?;
                    break;
                }
                // Zero-filled space left behind by a crash during extension.
                Err(_) if contents[offset..].iter().all(|b| *b == 0) => {
                    self.repair_torn_tail(offset, contents.len())?;
                    break;
                }
                Err(e) => {
                    return Err(StorageError::corruption_at_offset(
                        offset as u64,
                        e.to_string(),
                    ))
                }
            }
        }

        Ok(records)
    }

    fn append(&mut self, record: &CommitRecord) -> StorageResult<()> {
        let serialized = encode(record)?;
        let offset = self.len;

        let written = self
            .file
            .write_all(&serialized)
            .and_then(|_| self.file.sync_data());

        if let Err(e) = written {
            if let Err(undo) = self.truncate_to(offset) {
                tracing::error!(
                    path = %self.path.display(),
                    offset,
                    error = %undo,
                    "failed to roll back partial commit record"
                );
            }
            return Err(StorageError::commit_failed(
                format!("Failed to persist commit {}", record.sequence),
                e,
            ));
        }

        self.len += serialized.len() as u64;
        Ok(())
    }

    fn compact(&mut self, base: &CommitRecord) -> StorageResult<()> {
        let serialized = encode(base)?;
        let temp_path = sibling(&self.path, ".compact");

        // Leftover from an earlier interrupted compaction
        if temp_path.exists() {
            fs::remove_file(&temp_path).map_err(|e| {
                StorageError::io_error(
                    format!("Failed to remove stale compaction file: {}", temp_path.display()),
                    e,
                )
            })?;
        }

        // The handle written here becomes the live log after the rename.
        let written = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&temp_path)
            .and_then(|mut temp| {
                temp.write_all(&serialized)?;
                temp.sync_all()?;
                Ok(temp)
            });

        let temp = match written {
            Ok(temp) => temp,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(StorageError::io_error(
                    format!("Failed to write compacted log: {}", temp_path.display()),
                    e,
                ));
            }
        };

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::io_error(
                format!("Failed to install compacted log: {}", self.path.display()),
                e,
            ));
        }

        self.file = temp;
        self.len = serialized.len() as u64;

        self.sync_parent_dir().map_err(|e| {
            StorageError::io_error("Failed to sync data directory after compaction", e)
        })
    }

    fn size(&self) -> u64 {
        self.len
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory commit log for tests and ephemeral stores.
///
/// An optional shared flag makes `append` fail while it is set, which lets
/// tests observe rollback behavior without touching a disk.
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Vec<CommitRecord>,
    bytes: u64,
    fail_appends: Option<Arc<AtomicBool>>,
}

impl MemoryLog {
    /// Create an empty in-memory log
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log whose appends fail whenever `flag` is set
    pub fn failing_when(flag: Arc<AtomicBool>) -> Self {
        Self {
            fail_appends: Some(flag),
            ..Self::default()
        }
    }

    /// Number of records appended so far
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn check_injected_failure(&self, sequence: u64) -> StorageResult<()> {
        match &self.fail_appends {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(StorageError::commit_failed_no_source(
                format!("Injected failure for commit {}", sequence),
            )),
            _ => Ok(()),
        }
    }
}

impl CommitLog for MemoryLog {
    fn replay(&mut self) -> StorageResult<Vec<CommitRecord>> {
        Ok(self.records.clone())
    }

    fn append(&mut self, record: &CommitRecord) -> StorageResult<()> {
        self.check_injected_failure(record.sequence)?;
        let encoded = encode(record)?;
        self.records.push(record.clone());
        self.bytes += encoded.len() as u64;
        Ok(())
    }

    fn compact(&mut self, base: &CommitRecord) -> StorageResult<()> {
        self.check_injected_failure(base.sequence)?;
        let encoded = encode(base)?;
        self.records = vec![base.clone()];
        self.bytes = encoded.len() as u64;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.bytes
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
