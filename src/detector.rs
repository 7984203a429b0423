//! Change detection against the committed manifest

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, warn};

use crate::digest::{Digest, DigestAlgorithm};
use crate::error::{Result, WatchError};
use crate::manifest::Manifest;

/// Classification of a single path against the manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeRecord {
    /// Present now, absent from the manifest
    Added(PathBuf),
    /// Present in both, digest differs
    Modified(PathBuf),
    /// In the manifest, no longer present
    Deleted(PathBuf),
    /// Present in both, digest equal
    Unchanged(PathBuf),
}

/// Record kind without the path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

/// How loudly a record should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Notice,
    Warning,
    Critical,
}

impl ChangeRecord {
    /// Path this record refers to
    pub fn path(&self) -> &Path {
        match self {
            ChangeRecord::Added(p)
            | ChangeRecord::Modified(p)
            | ChangeRecord::Deleted(p)
            | ChangeRecord::Unchanged(p) => p,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeRecord::Added(_) => ChangeKind::Added,
            ChangeRecord::Modified(_) => ChangeKind::Modified,
            ChangeRecord::Deleted(_) => ChangeKind::Deleted,
            ChangeRecord::Unchanged(_) => ChangeKind::Unchanged,
        }
    }

    /// Anything other than `Unchanged`
    pub fn is_change(&self) -> bool {
        !matches!(self, ChangeRecord::Unchanged(_))
    }

    pub fn severity(&self) -> Severity {
        match self {
            ChangeRecord::Unchanged(_) => Severity::Info,
            ChangeRecord::Added(_) => Severity::Notice,
            ChangeRecord::Modified(_) => Severity::Warning,
            ChangeRecord::Deleted(_) => Severity::Critical,
        }
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeRecord::Added(p) => write!(f, "New file detected: {}", p.display()),
            ChangeRecord::Modified(p) => write!(f, "File changed: {}", p.display()),
            ChangeRecord::Deleted(p) => write!(f, "File deleted: {}", p.display()),
            ChangeRecord::Unchanged(p) => write!(f, "File unchanged: {}", p.display()),
        }
    }
}

/// Classify `current_paths` against `manifest`.
///
/// Records for current paths come first, sorted by path, followed by
/// `Deleted` records for manifest paths no longer present, also sorted.
pub fn detect<F>(
    current_paths: &[PathBuf],
    mut digest_of: F,
    manifest: &Manifest,
) -> Result<Vec<ChangeRecord>>
where
    F: FnMut(&Path) -> Result<Digest>,
{
    let mut sorted: Vec<&PathBuf> = current_paths.iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut records = Vec::with_capacity(sorted.len());
    let mut seen = HashSet::with_capacity(sorted.len());

    for path in sorted {
        let digest = digest_of(path.as_path())?;
        let record = match manifest.get(path) {
            Some(stored) if *stored != digest => ChangeRecord::Modified(path.clone()),
            Some(_) => ChangeRecord::Unchanged(path.clone()),
            None => ChangeRecord::Added(path.clone()),
        };
        records.push(record);
        seen.insert(path.as_path());
    }

    for path in manifest.sorted_paths() {
        if !seen.contains(path.as_path()) {
            records.push(ChangeRecord::Deleted(path.clone()));
        }
    }

    Ok(records)
}

/// List the regular files directly inside `dir`, sorted by path.
///
/// Subdirectories are not traversed.
pub async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            WatchError::DirectoryNotFound(dir.to_path_buf())
        } else {
            WatchError::IoError(e)
        }
    })?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.to_str().is_none() {
            warn!(path = %path.display(), "Skipping file name that is not valid UTF-8");
            continue;
        }
        // Follows symlinks; entries that vanish mid-listing are dropped
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    files.sort();
    Ok(files)
}

/// Computes digests for the live directory and classifies them
pub struct ChangeDetector {
    engine: Arc<dyn DigestAlgorithm>,
}

impl ChangeDetector {
    /// Create a detector using `engine` for fingerprints
    pub fn new(engine: Arc<dyn DigestAlgorithm>) -> Self {
        Self { engine }
    }

    /// Read every file in `paths` and fingerprint it.
    ///
    /// A file that disappears between listing and reading is left out.
    pub async fn digest_files(&self, paths: &[PathBuf]) -> Result<HashMap<PathBuf, Digest>> {
        let mut digests = HashMap::with_capacity(paths.len());
        for path in paths {
            match fs::read(path).await {
                Ok(bytes) => {
                    digests.insert(path.clone(), self.engine.digest(&bytes));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "File vanished before it could be read");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(digests)
    }

    /// Scan `dir` and classify its files against `manifest`
    pub async fn scan(&self, dir: &Path, manifest: &Manifest) -> Result<Vec<ChangeRecord>> {
        let listed = list_files(dir).await?;
        let digests = self.digest_files(&listed).await?;
        let present: Vec<PathBuf> = digests.keys().cloned().collect();

        let records = detect(
            &present,
            |path| {
                digests
                    .get(path)
                    .copied()
                    .ok_or_else(|| WatchError::PathNotFound(path.to_path_buf()))
            },
            manifest,
        )?;

        debug!(
            dir = %dir.display(),
            files = present.len(),
            changes = records.iter().filter(|r| r.is_change()).count(),
            algorithm = self.engine.name(),
            "Scanned directory"
        );
        Ok(records)
    }
}

/// Counts of each change kind in a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ChangeSummary {
    /// Tally `records`
    pub fn from_records(records: &[ChangeRecord]) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record.kind() {
                ChangeKind::Added => summary.added += 1,
                ChangeKind::Modified => summary.modified += 1,
                ChangeKind::Deleted => summary.deleted += 1,
                ChangeKind::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Check if nothing changed
    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }

    /// Get total number of changed files
    pub fn total_changes(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Md5;
    use tempfile::tempdir;

    fn manifest_of(entries: &[(&str, &[u8])]) -> Manifest {
        entries
            .iter()
            .map(|(p, content)| (PathBuf::from(p), Md5.digest(content)))
            .collect()
    }

    fn contents(entries: &[(&'static str, &'static [u8])]) -> HashMap<PathBuf, Digest> {
        entries
            .iter()
            .map(|(p, content)| (PathBuf::from(p), Md5.digest(content)))
            .collect()
    }

    fn run(current: &HashMap<PathBuf, Digest>, manifest: &Manifest) -> Vec<ChangeRecord> {
        let paths: Vec<PathBuf> = current.keys().cloned().collect();
        detect(&paths, |p| Ok(current[p]), manifest).unwrap()
    }

    // === detect Tests ===

    #[test]
    fn test_detect_basic() {
        let manifest = manifest_of(&[("/a.txt", b"old"), ("/b.txt", b"same"), ("/c.txt", b"gone")]);
        let current = contents(&[("/a.txt", b"new"), ("/b.txt", b"same"), ("/d.txt", b"added")]);

        let records = run(&current, &manifest);

        assert_eq!(
            records,
            vec![
                ChangeRecord::Modified(PathBuf::from("/a.txt")),
                ChangeRecord::Unchanged(PathBuf::from("/b.txt")),
                ChangeRecord::Added(PathBuf::from("/d.txt")),
                ChangeRecord::Deleted(PathBuf::from("/c.txt")),
            ]
        );
    }

    #[test]
    fn test_detect_empty_manifest() {
        let current = contents(&[("/a.txt", b"a"), ("/b.txt", b"b")]);
        let records = run(&current, &Manifest::new());

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.kind() == ChangeKind::Added));
    }

    #[test]
    fn test_detect_empty_directory() {
        let manifest = manifest_of(&[("/b.txt", b"b"), ("/a.txt", b"a")]);
        let records = run(&HashMap::new(), &manifest);

        assert_eq!(
            records,
            vec![
                ChangeRecord::Deleted(PathBuf::from("/a.txt")),
                ChangeRecord::Deleted(PathBuf::from("/b.txt")),
            ]
        );
    }

    #[test]
    fn test_detect_no_changes() {
        let manifest = manifest_of(&[("/a.txt", b"a")]);
        let current = contents(&[("/a.txt", b"a")]);

        let records = run(&current, &manifest);
        assert!(ChangeSummary::from_records(&records).is_empty());
    }

    #[test]
    fn test_detect_propagates_digest_error() {
        let paths = vec![PathBuf::from("/a.txt")];
        let result = detect(
            &paths,
            |p| Err(WatchError::PathNotFound(p.to_path_buf())),
            &Manifest::new(),
        );
        assert!(matches!(result, Err(WatchError::PathNotFound(_))));
    }

    // === ChangeRecord Tests ===

    #[test]
    fn test_record_display() {
        let path = PathBuf::from("/w/a.txt");
        assert_eq!(ChangeRecord::Modified(path.clone()).to_string(), "File changed: /w/a.txt");
        assert_eq!(ChangeRecord::Added(path.clone()).to_string(), "New file detected: /w/a.txt");
        assert_eq!(ChangeRecord::Deleted(path.clone()).to_string(), "File deleted: /w/a.txt");
        assert_eq!(ChangeRecord::Unchanged(path).to_string(), "File unchanged: /w/a.txt");
    }

    #[test]
    fn test_record_severity_order() {
        let path = PathBuf::from("/a");
        let deleted = ChangeRecord::Deleted(path.clone()).severity();
        let modified = ChangeRecord::Modified(path.clone()).severity();
        let added = ChangeRecord::Added(path.clone()).severity();
        assert!(deleted > modified);
        assert!(modified > added);
        assert!(!ChangeRecord::Unchanged(path).is_change());
    }

    #[test]
    fn test_summary_total_changes() {
        let records = vec![
            ChangeRecord::Added(PathBuf::from("/a")),
            ChangeRecord::Added(PathBuf::from("/b")),
            ChangeRecord::Modified(PathBuf::from("/c")),
            ChangeRecord::Unchanged(PathBuf::from("/d")),
            ChangeRecord::Deleted(PathBuf::from("/e")),
        ];
        let summary = ChangeSummary::from_records(&records);
        assert_eq!(summary.added, 2);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.total_changes(), 4);
    }

    // === Filesystem Tests ===

    #[tokio::test]
    async fn test_list_files_is_flat() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.txt"), "c").unwrap();

        let files = list_files(dir.path()).await.unwrap();
        assert_eq!(files, vec![dir.path().join("a.txt"), dir.path().join("b.txt")]);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_list_files_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"bad\xffname.txt")), "b").unwrap();

        let files = list_files(dir.path()).await.unwrap();
        assert_eq!(files, vec![dir.path().join("a.txt")]);
    }

    #[tokio::test]
    async fn test_list_files_missing_dir() {
        let dir = tempdir().unwrap();
        let err = list_files(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, WatchError::DirectoryNotFound(_)));
    }

    #[tokio::test]
    async fn test_scan_directory() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        std::fs::write(&a, "X").unwrap();

        let mut manifest = Manifest::new();
        manifest.insert(a.clone(), Md5.digest(b"Y"));

        let detector = ChangeDetector::new(Arc::new(Md5));
        let records = detector.scan(dir.path(), &manifest).await.unwrap();
        assert_eq!(records, vec![ChangeRecord::Modified(a)]);
    }
}
