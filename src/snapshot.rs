//! Snapshot archives
//!
//! Each commit can copy the watched files into
//! `<runtime>/snapshots/<timestamp>/`, flattened to their basenames.
//! Archives are write-once; restoring one wipes the watched directory's
//! files and copies the archive back.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::detector::list_files;
use crate::error::{Result, WatchError};

/// Timestamp layout for snapshot identifiers; sorts lexicographically
pub const SNAPSHOT_ID_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Identifier of a snapshot archive, a UTC creation timestamp
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Identifier for a snapshot taken at `time`
    pub fn from_time(time: DateTime<Utc>) -> Self {
        Self(time.format(SNAPSHOT_ID_FORMAT).to_string())
    }

    /// Identifier for a snapshot taken now
    pub fn now() -> Self {
        Self::from_time(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time encoded in the identifier
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.0, SNAPSHOT_ID_FORMAT)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    /// Whether the identifier can name a single directory entry
    fn is_plain_name(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\'])
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

impl From<&str> for SnapshotId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A snapshot archive and the files it holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Identifier
    pub id: SnapshotId,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// Archived file names
    pub files: Vec<PathBuf>,
}

impl Snapshot {
    /// Get summary description
    pub fn summary(&self) -> String {
        format!(
            "Snapshot {} ({} files, {})",
            self.id,
            self.files.len(),
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Creates, lists and restores snapshot archives
pub struct SnapshotManager {
    /// Archive root
    snapshots_dir: PathBuf,
    /// Directory that restores write into
    target_dir: PathBuf,
}

impl SnapshotManager {
    /// Create a manager archiving `target_dir` under `snapshots_dir`
    pub fn new(snapshots_dir: PathBuf, target_dir: PathBuf) -> Self {
        Self {
            snapshots_dir,
            target_dir,
        }
    }

    /// Archive root
    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }

    /// Copy `source_files` into a new archive named after the current time
    pub async fn create_snapshot(&self, source_files: &[PathBuf]) -> Result<Snapshot> {
        self.create_snapshot_at(Utc::now(), source_files).await
    }

    /// Copy `source_files` into a new archive named after `time`.
    ///
    /// Files are stored by basename. A copy failure aborts the snapshot and
    /// leaves whatever was already copied in place.
    pub async fn create_snapshot_at(
        &self,
        time: DateTime<Utc>,
        source_files: &[PathBuf],
    ) -> Result<Snapshot> {
        let id = SnapshotId::from_time(time);
        let archive = self.snapshots_dir.join(id.as_str());

        fs::create_dir_all(&self.snapshots_dir).await?;
        fs::create_dir(&archive).await.map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                WatchError::SnapshotExists(id.clone())
            } else {
                WatchError::IoError(e)
            }
        })?;

        let mut files = Vec::with_capacity(source_files.len());
        for source in source_files {
            let Some(name) = source.file_name() else {
                warn!(path = %source.display(), "Skipping path without a file name");
                continue;
            };

            fs::copy(source, archive.join(name))
                .await
                .map_err(|e| WatchError::copy(source, e))?;
            files.push(PathBuf::from(name));
        }
        files.sort();

        info!(
            snapshot_id = %id,
            files = files.len(),
            "Created snapshot"
        );

        Ok(Snapshot {
            id,
            created_at: time,
            files,
        })
    }

    /// List archive identifiers, oldest first
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotId>> {
        let mut entries = match fs::read_dir(&self.snapshots_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                ids.push(SnapshotId(entry.file_name().to_string_lossy().into_owned()));
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Load the metadata of an existing archive
    pub async fn load(&self, id: &SnapshotId) -> Result<Snapshot> {
        let archive = self.archive_path(id)?;
        let files = archive_files(&archive).await?;

        let created_at = match id.timestamp() {
            Some(ts) => ts,
            None => fs::metadata(&archive)
                .await?
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        };

        Ok(Snapshot {
            id: id.clone(),
            created_at,
            files: files
                .iter()
                .filter_map(|p| p.file_name().map(PathBuf::from))
                .collect(),
        })
    }

    /// Replace the watched directory's files with the archive `id`.
    ///
    /// Destructive and non-transactional: once deletion starts, a later
    /// failure leaves the directory partially restored. A missing archive is
    /// detected before anything is touched.
    pub async fn restore_snapshot(&self, id: &SnapshotId) -> Result<Vec<PathBuf>> {
        let archive = self.archive_path(id)?;
        let archived = archive_files(&archive).await?;

        let current = list_files(&self.target_dir).await?;
        for path in &current {
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(WatchError::RestoreError(format!(
                        "Failed to remove {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }
        debug!(removed = current.len(), "Cleared watched directory");

        let mut restored = Vec::with_capacity(archived.len());
        for source in &archived {
            let Some(name) = source.file_name() else {
                continue;
            };
            let dest = self.target_dir.join(name);
            fs::copy(source, &dest)
                .await
                .map_err(|e| WatchError::copy(source, e))?;
            restored.push(dest);
        }

        info!(
            snapshot_id = %id,
            removed = current.len(),
            restored = restored.len(),
            "Restored snapshot"
        );

        Ok(restored)
    }

    fn archive_path(&self, id: &SnapshotId) -> Result<PathBuf> {
        let archive = self.snapshots_dir.join(id.as_str());
        if !id.is_plain_name() {
            return Err(WatchError::PathNotFound(archive));
        }
        Ok(archive)
    }
}

/// Files of an archive; a missing archive is `PathNotFound`
async fn archive_files(archive: &Path) -> Result<Vec<PathBuf>> {
    match list_files(archive).await {
        Ok(files) => Ok(files),
        Err(WatchError::DirectoryNotFound(p)) => Err(WatchError::PathNotFound(p)),
        // A regular file under the snapshots directory is not an archive
        Err(e) if !is_dir(archive).await => {
            debug!(archive = %archive.display(), error = %e, "Snapshot is not a directory");
            Err(WatchError::PathNotFound(archive.to_path_buf()))
        }
        Err(e) => Err(e),
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}
