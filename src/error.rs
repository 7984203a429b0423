//! Watcher error types

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::snapshot::SnapshotId;

/// Errors that can occur in watch, commit and revert operations
#[derive(Debug, Error)]
pub enum WatchError {
    /// Manifest file or snapshot archive missing
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Watched directory missing
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// Manifest cannot be written because its directory is gone
    #[error("Manifest unavailable: {0}")]
    ManifestUnavailable(PathBuf),

    /// A file could not be copied into or out of a snapshot
    #[error("Copy error for {path}: {source}")]
    CopyFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another snapshot was already created under the same timestamp
    #[error("Snapshot already exists: {0}")]
    SnapshotExists(SnapshotId),

    /// Revert left the directory partially restored
    #[error("Restore error: {0}")]
    RestoreError(String),

    /// Configuration could not be read
    #[error("Config error: {0}")]
    Config(String),

    /// Scheduler has been terminated
    #[error("Scheduler terminated")]
    Terminated,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl WatchError {
    /// Classify an IO error on `path`, mapping not-found onto `PathNotFound`.
    pub(crate) fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            WatchError::PathNotFound(path.to_path_buf())
        } else {
            WatchError::IoError(err)
        }
    }

    /// Classify a failed copy of `path`.
    pub(crate) fn copy(path: &Path, source: io::Error) -> Self {
        WatchError::CopyFailure {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_not_found() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let classified = WatchError::from_io(Path::new("/tmp/x"), err);
        assert!(matches!(classified, WatchError::PathNotFound(p) if p == Path::new("/tmp/x")));
    }

    #[test]
    fn test_from_io_other() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let classified = WatchError::from_io(Path::new("/tmp/x"), err);
        assert!(matches!(classified, WatchError::IoError(_)));
    }

    #[test]
    fn test_copy_failure_message() {
        let err = WatchError::copy(
            Path::new("/tmp/a.txt"),
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("/tmp/a.txt"));
    }
}
