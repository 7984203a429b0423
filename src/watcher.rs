//! Watcher - the commit / scan / revert surface over one directory

use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::WatchConfig;
use crate::detector::{list_files, ChangeDetector, ChangeRecord};
use crate::digest::DigestAlgorithm;
use crate::error::{Result, WatchError};
use crate::manifest::{Manifest, ManifestStore};
use crate::snapshot::{SnapshotId, SnapshotManager};

/// Outcome of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// Number of files written to the manifest
    pub files: usize,
    /// Snapshot taken alongside, if enabled
    pub snapshot: Option<SnapshotId>,
}

/// Watches a single directory against its committed baseline.
///
/// Every scan, commit and revert holds one lock over the manifest and the
/// directory listing, so they never interleave.
pub struct Watcher {
    /// Configuration, with `target_dir` canonicalized
    config: WatchConfig,
    /// Manifest persistence
    store: ManifestStore,
    /// Fingerprint + classification
    detector: ChangeDetector,
    /// Archive management
    snapshots: SnapshotManager,
    /// Guards manifest + directory listing as one unit
    workspace: Mutex<()>,
    /// Result of the most recent commit
    last_commit: RwLock<Option<CommitSummary>>,
}

impl Watcher {
    /// Open a watcher over `config.target_dir`.
    ///
    /// Fails with `DirectoryNotFound` if the directory is missing. Creates the
    /// runtime directory and an empty manifest on first use.
    pub async fn open(mut config: WatchConfig) -> Result<Self> {
        let target_dir = canonical_dir(&config.target_dir).await?;
        config.target_dir = target_dir.clone();

        let engine = config.algorithm.engine();
        let store = ManifestStore::new(config.manifest_path());
        store.init().await?;

        info!(
            target = %target_dir.display(),
            algorithm = engine.name(),
            "Opened watcher"
        );

        Ok(Self {
            store,
            detector: ChangeDetector::new(engine),
            snapshots: SnapshotManager::new(config.snapshots_dir(), target_dir),
            config,
            workspace: Mutex::new(()),
            last_commit: RwLock::new(None),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Canonical watched directory
    pub fn target_dir(&self) -> &Path {
        &self.config.target_dir
    }

    /// Compare the directory against the manifest.
    ///
    /// Manual runs return every record including `Unchanged`; silent runs
    /// return only changes.
    pub async fn run_detection(&self, is_manual: bool) -> Result<Vec<ChangeRecord>> {
        let _guard = self.workspace.lock().await;

        let manifest = self.store.load().await?;
        let mut records = self.detector.scan(self.target_dir(), &manifest).await?;
        if !is_manual {
            records.retain(ChangeRecord::is_change);
        }

        debug!(manual = is_manual, records = records.len(), "Detection pass complete");
        Ok(records)
    }

    /// Recompute every digest, overwrite the manifest and optionally snapshot
    pub async fn commit(&self) -> Result<CommitSummary> {
        let _guard = self.workspace.lock().await;

        self.store.init().await?;
        let listed = list_files(self.target_dir()).await?;
        let digests = self.detector.digest_files(&listed).await?;

        let mut files: Vec<PathBuf> = digests.keys().cloned().collect();
        files.sort();
        let manifest = Manifest::from(digests);
        self.store.save(&manifest).await?;

        let snapshot = if self.config.snapshot_on_commit {
            Some(self.snapshots.create_snapshot(&files).await?.id)
        } else {
            None
        };

        let summary = CommitSummary {
            files: manifest.len(),
            snapshot,
        };
        *self.last_commit.write() = Some(summary.clone());

        info!(
            files = summary.files,
            snapshot = ?summary.snapshot.as_ref().map(SnapshotId::as_str),
            "Committed baseline"
        );
        Ok(summary)
    }

    /// Available snapshot identifiers, oldest first
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotId>> {
        self.snapshots.list_snapshots().await
    }

    /// Restore the directory from snapshot `id`.
    ///
    /// A failure after deletion has started leaves the directory partially
    /// restored; it is logged at error level and returned.
    pub async fn revert(&self, id: &SnapshotId) -> Result<Vec<PathBuf>> {
        let _guard = self.workspace.lock().await;

        match self.snapshots.restore_snapshot(id).await {
            Ok(restored) => Ok(restored),
            Err(e @ WatchError::PathNotFound(_)) => Err(e),
            Err(e) => {
                error!(
                    snapshot_id = %id,
                    target = %self.target_dir().display(),
                    error = %e,
                    "Revert failed; directory is partially restored and needs manual recovery"
                );
                Err(e)
            }
        }
    }

    /// Result of the most recent commit made through this watcher
    pub fn last_commit(&self) -> Option<CommitSummary> {
        self.last_commit.read().clone()
    }

    #[cfg(test)]
    pub(crate) async fn workspace_lock_for_test(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.workspace.lock().await
    }
}

async fn canonical_dir(path: &Path) -> Result<PathBuf> {
    let not_found = || WatchError::DirectoryNotFound(path.to_path_buf());

    let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            not_found()
        } else {
            WatchError::IoError(e)
        }
    })?;

    if !tokio::fs::metadata(&canonical).await?.is_dir() {
        return Err(not_found());
    }
    Ok(canonical)
}
