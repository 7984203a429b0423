//! Watcher configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::DigestKind;
use crate::error::{Result, WatchError};

/// Name of the bookkeeping directory inside the watched folder
pub const RUNTIME_DIR_NAME: &str = ".runtimedir";
/// Manifest file name inside the runtime directory
pub const MANIFEST_FILE_NAME: &str = "hashlist";
/// Archive root name inside the runtime directory
pub const SNAPSHOTS_DIR_NAME: &str = "snapshots";

/// Default background scan interval
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 5000;

/// Configuration for a watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory being watched
    pub target_dir: PathBuf,
    /// Background scan interval in milliseconds
    pub scan_interval_ms: u64,
    /// Archive file contents on every commit
    pub snapshot_on_commit: bool,
    /// Fingerprint algorithm
    pub algorithm: DigestKind,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("./target_test_folder"),
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            snapshot_on_commit: true,
            algorithm: DigestKind::default(),
        }
    }
}

impl WatchConfig {
    /// Config watching `target_dir` with defaults for everything else
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| WatchError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| WatchError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_snapshot_on_commit(mut self, enabled: bool) -> Self {
        self.snapshot_on_commit = enabled;
        self
    }

    pub fn with_algorithm(mut self, algorithm: DigestKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Background scan interval; never zero
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.max(1))
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.target_dir.join(RUNTIME_DIR_NAME)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.runtime_dir().join(MANIFEST_FILE_NAME)
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.runtime_dir().join(SNAPSHOTS_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.scan_interval(), Duration::from_millis(5000));
        assert!(config.snapshot_on_commit);
        assert_eq!(config.algorithm, DigestKind::Md5);
    }

    #[test]
    fn test_config_paths() {
        let config = WatchConfig::new("/data/watched");
        assert_eq!(config.manifest_path(), PathBuf::from("/data/watched/.runtimedir/hashlist"));
        assert_eq!(config.snapshots_dir(), PathBuf::from("/data/watched/.runtimedir/snapshots"));
    }

    #[test]
    fn test_config_builders() {
        let config = WatchConfig::new("/w")
            .with_scan_interval(Duration::from_millis(250))
            .with_snapshot_on_commit(false)
            .with_algorithm(DigestKind::Md5);
        assert_eq!(config.scan_interval_ms, 250);
        assert!(!config.snapshot_on_commit);
        assert_eq!(config.algorithm, DigestKind::Md5);
    }

    #[test]
    fn test_zero_interval_clamped() {
        let config = WatchConfig::new("/w").with_scan_interval(Duration::ZERO);
        assert_eq!(config.scan_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_config_from_json_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashwatch.json");
        std::fs::write(&path, r#"{"target_dir": "/srv/data", "scan_interval_ms": 1000}"#).unwrap();

        let config = WatchConfig::from_json_file(&path).unwrap();
        assert_eq!(config.target_dir, PathBuf::from("/srv/data"));
        assert_eq!(config.scan_interval_ms, 1000);
        assert!(config.snapshot_on_commit);
    }

    #[test]
    fn test_config_from_json_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hashwatch.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(WatchConfig::from_json_file(&path), Err(WatchError::Config(_))));
    }
}
