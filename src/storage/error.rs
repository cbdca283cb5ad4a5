//! Storage layer error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the storage layer.
///
/// Two tiers: recoverable conditions the caller may retry or surface upward,
/// and unrecoverable conditions (`is_unrecoverable`) after which no in-process
/// recovery is safe. Internal code returns both tiers normally; only the
/// process entry point turns the unrecoverable tier into an abort.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cache is full: all {capacity} slots hold referenced resources")]
    CacheFull { capacity: usize },

    #[error("cache is busy: timed out waiting for key {key} to load")]
    Busy { key: u64 },

    #[error("file already exists: {0}")]
    FileExists(PathBuf),

    #[error("file does not exist: {0}")]
    FileNotFound(PathBuf),

    #[error("file cannot be read or written: {0}")]
    FileNotWritable(PathBuf),

    #[error("memory budget too small: {budget} bytes is {pages} pages, minimum is {min}")]
    MemoryTooSmall {
        budget: u64,
        pages: usize,
        min: usize,
    },

    #[error("data too large for page: {len} bytes, {available} free")]
    DataTooLarge { len: usize, available: usize },

    #[error("bad log file: {reason}")]
    BadLog { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the on-disk state is demonstrably inconsistent and continuing
    /// risks propagating corruption.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, StorageError::BadLog { .. } | StorageError::Io(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_tiers() {
        assert!(!StorageError::CacheFull { capacity: 4 }.is_unrecoverable());
        assert!(!StorageError::Busy { key: 1 }.is_unrecoverable());
        assert!(!StorageError::DataTooLarge {
            len: 9000,
            available: 100
        }
        .is_unrecoverable());

        assert!(StorageError::BadLog {
            reason: "checksum chain mismatch".into()
        }
        .is_unrecoverable());
        assert!(
            StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
                .is_unrecoverable()
        );
    }

    #[test]
    fn test_error_display_carries_context() {
        let err = StorageError::MemoryTooSmall {
            budget: 1024,
            pages: 0,
            min: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("1024"));
        assert!(msg.contains("minimum is 8"));
    }
}
