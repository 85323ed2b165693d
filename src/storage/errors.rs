//! Storage engine error types
//!
//! Error codes:
//! - VB_STORAGE_IO_ERROR (ERROR severity)
//! - VB_STORAGE_COMMIT_FAILED (ERROR severity)
//! - VB_STORAGE_BUCKET_NOT_FOUND (ERROR severity)
//! - VB_STORAGE_LOCKED (ERROR severity)
//! - VB_DATA_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, process continues
    Error,
    /// The store must not be used further
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Disk I/O failure while opening or reading the log
    StorageIoError,
    /// Append or fsync failed during commit; the transaction was rolled back
    CommitFailed,
    /// A transaction referenced a bucket that was never created
    BucketNotFound,
    /// Checksum or structural failure in the commit log
    DataCorruption,
    /// Another handle holds the exclusive lock on the store file
    StoreLocked,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::StorageIoError => "VB_STORAGE_IO_ERROR",
            StorageErrorCode::CommitFailed => "VB_STORAGE_COMMIT_FAILED",
            StorageErrorCode::BucketNotFound => "VB_STORAGE_BUCKET_NOT_FOUND",
            StorageErrorCode::DataCorruption => "VB_DATA_CORRUPTION",
            StorageErrorCode::StoreLocked => "VB_STORAGE_LOCKED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::StorageIoError => Severity::Error,
            StorageErrorCode::CommitFailed => Severity::Error,
            StorageErrorCode::BucketNotFound => Severity::Error,
            StorageErrorCode::DataCorruption => Severity::Fatal,
            StorageErrorCode::StoreLocked => Severity::Error,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with code, message and optional context
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StorageError {
    /// Create a new storage I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::StorageIoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a commit failure error
    pub fn commit_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::CommitFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a commit failure error without IO source
    pub fn commit_failed_no_source(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::CommitFailed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create an error for a store already opened by another handle
    pub fn store_locked(path: &std::path::Path) -> Self {
        Self {
            code: StorageErrorCode::StoreLocked,
            message: "Store is already open elsewhere".to_string(),
            details: Some(format!("path: {}", path.display())),
            source: None,
        }
    }

    /// Create a missing bucket error
    pub fn bucket_not_found(bucket: &str) -> Self {
        Self {
            code: StorageErrorCode::BucketNotFound,
            message: "Bucket does not exist".to_string(),
            details: Some(format!("bucket: {}", bucket)),
            source: None,
        }
    }

    /// Create a new data corruption error (FATAL)
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::DataCorruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a data corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::DataCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StorageErrorCode::StorageIoError.code(), "VB_STORAGE_IO_ERROR");
        assert_eq!(StorageErrorCode::CommitFailed.code(), "VB_STORAGE_COMMIT_FAILED");
        assert_eq!(StorageErrorCode::BucketNotFound.code(), "VB_STORAGE_BUCKET_NOT_FOUND");
        assert_eq!(StorageErrorCode::DataCorruption.code(), "VB_DATA_CORRUPTION");
        assert_eq!(StorageErrorCode::StoreLocked.code(), "VB_STORAGE_LOCKED");
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(StorageError::data_corruption("checksum mismatch").is_fatal());
        assert!(!StorageError::bucket_not_found("users").is_fatal());
        assert!(!StorageError::store_locked(std::path::Path::new("app.db")).is_fatal());
        assert!(!StorageError::commit_failed(
            "disk full",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        )
        .is_fatal());
    }

    #[test]
    fn test_error_display_contains_context() {
        let err = StorageError::corruption_at_offset(1024, "checksum mismatch");
        let display = format!("{}", err);
        assert!(display.contains("VB_DATA_CORRUPTION"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("checksum mismatch"));
        assert!(display.contains("byte_offset: 1024"));
    }

    #[test]
    fn test_io_source_is_exposed() {
        use std::error::Error;

        let err = StorageError::io_error(
            "open failed",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.source().is_some());
        assert!(StorageError::bucket_not_found("x").source().is_none());
    }
}
