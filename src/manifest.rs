//! Baseline manifest persistence
//!
//! The manifest is a line-oriented text file, one `path:digesthex` entry per
//! line. Lines that do not split into exactly two `:` segments are skipped.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::digest::Digest;
use crate::error::{Result, WatchError};

/// Mapping of watched path to its digest as of the last commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: HashMap<PathBuf, Digest>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the digest for `path`
    pub fn insert(&mut self, path: PathBuf, digest: Digest) -> Option<Digest> {
        self.entries.insert(path, digest)
    }

    /// Digest recorded for `path`
    pub fn get(&self, path: &Path) -> Option<&Digest> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded paths sorted ascending
    pub fn sorted_paths(&self) -> Vec<&PathBuf> {
        let mut paths: Vec<_> = self.entries.keys().collect();
        paths.sort();
        paths
    }

    /// Parse manifest text, skipping malformed lines
    pub fn parse(text: &str) -> Self {
        let mut manifest = Self::new();

        for (line_no, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }

            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() != 2 {
                debug!(line = line_no + 1, "Skipping corrupt manifest line");
                continue;
            }

            match Digest::from_hex(parts[1]) {
                Ok(digest) => {
                    manifest.insert(PathBuf::from(parts[0]), digest);
                }
                Err(e) => {
                    debug!(
                        line = line_no + 1,
                        error = %e,
                        "Skipping manifest line with bad digest"
                    );
                }
            }
        }

        manifest
    }

    /// Render manifest text, one newline-terminated line per entry, sorted by path
    pub fn render(&self) -> String {
        let mut out = String::new();
        for path in self.sorted_paths() {
            let Some(rendered) = path.to_str() else {
                warn!(path = %path.display(), "Skipping path that is not valid UTF-8");
                continue;
            };
            if rendered.contains(':') {
                warn!(
                    path = %rendered,
                    "Path contains ':' and will not survive a manifest reload"
                );
            }
            out.push_str(rendered);
            out.push(':');
            out.push_str(&self.entries[path].to_hex());
            out.push('\n');
        }
        out
    }
}

impl From<HashMap<PathBuf, Digest>> for Manifest {
    fn from(entries: HashMap<PathBuf, Digest>) -> Self {
        Self { entries }
    }
}

impl FromIterator<(PathBuf, Digest)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (PathBuf, Digest)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Reads and writes the manifest file
pub struct ManifestStore {
    /// Location of the manifest file
    path: PathBuf,
}

impl ManifestStore {
    /// Create a store for the manifest at `path`
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Manifest file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the parent directory and an empty manifest if none exists yet.
    ///
    /// An existing manifest is left untouched.
    pub async fn init(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(_) => {
                debug!(path = %self.path.display(), "Created empty manifest");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the manifest
    pub async fn load(&self) -> Result<Manifest> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !self.parent_exists().await => {
                return Err(WatchError::ManifestUnavailable(self.path.clone()));
            }
            Err(e) => return Err(WatchError::from_io(&self.path, e)),
        };

        let manifest = Manifest::parse(&text);
        debug!(
            path = %self.path.display(),
            entries = manifest.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Overwrite the manifest wholesale
    pub async fn save(&self, manifest: &Manifest) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| WatchError::ManifestUnavailable(self.path.clone()))?;

        // Write beside the target and rename so readers never see a partial file
        let temp_path = parent.join(format!(".hashlist-{}.tmp", std::process::id()));

        if let Err(e) = fs::write(&temp_path, manifest.render()).await {
            return Err(if e.kind() == io::ErrorKind::NotFound {
                WatchError::ManifestUnavailable(self.path.clone())
            } else {
                WatchError::IoError(e)
            });
        }

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(
            path = %self.path.display(),
            entries = manifest.len(),
            "Saved manifest"
        );
        Ok(())
    }

    async fn parent_exists(&self) -> bool {
        match self.path.parent() {
            Some(parent) => fs::metadata(parent).await.map(|m| m.is_dir()).unwrap_or(false),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{DigestAlgorithm, Md5};
    use tempfile::tempdir;

    fn sample() -> Manifest {
        let mut manifest = Manifest::new();
        manifest.insert(PathBuf::from("/watched/a.txt"), Md5.digest(b"a"));
        manifest.insert(PathBuf::from("/watched/b.txt"), Md5.digest(b"b"));
        manifest
    }

    // === Parse Tests ===

    #[test]
    fn test_parse_valid_lines() {
        let text = "/w/a.txt:0cc175b9c0f1b6a831c399e269772661\n\
                    /w/b.txt:92eb5ffee6ae2fec3ad71c777531578f\n";
        let manifest = Manifest::parse(text);
        assert_eq!(manifest.len(), 2);
        assert_eq!(
            manifest.get(Path::new("/w/a.txt")).map(|d| d.to_hex()),
            Some("0cc175b9c0f1b6a831c399e269772661".to_string())
        );
    }

    #[test]
    fn test_parse_skips_corrupt_lines() {
        let text = "/w/a.txt:0cc175b9c0f1b6a831c399e269772661\n\
                    garbage\n\
                    C:/w/b.txt:92eb5ffee6ae2fec3ad71c777531578f\n\
                    /w/c.txt:nothex\n\
                    \n\
                    /w/d.txt:0cc17";
        let manifest = Manifest::parse(text);
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains(Path::new("/w/a.txt")));
    }

    #[test]
    fn test_parse_duplicate_path_keeps_last() {
        let text = "/w/a.txt:0cc175b9c0f1b6a831c399e269772661\n\
                    /w/a.txt:d41d8cd98f00b204e9800998ecf8427e\n";
        let manifest = Manifest::parse(text);
        assert_eq!(manifest.len(), 1);
        assert_eq!(
            manifest.get(Path::new("/w/a.txt")).map(|d| d.to_hex()),
            Some("d41d8cd98f00b204e9800998ecf8427e".to_string())
        );
    }

    #[test]
    fn test_render_format() {
        let mut manifest = Manifest::new();
        manifest.insert(PathBuf::from("/w/a.txt"), Md5.digest(b""));
        assert_eq!(manifest.render(), "/w/a.txt:d41d8cd98f00b204e9800998ecf8427e\n");
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(Manifest::new().render(), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_render_skips_non_utf8_paths() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut manifest = Manifest::new();
        manifest.insert(PathBuf::from("/w/a.txt"), Md5.digest(b""));
        manifest.insert(
            Path::new("/w").join(OsStr::from_bytes(b"bad\xffname.txt")),
            Md5.digest(b"x"),
        );

        assert_eq!(manifest.render(), "/w/a.txt:d41d8cd98f00b204e9800998ecf8427e\n");
    }

    // === Store Tests ===

    #[tokio::test]
    async fn test_store_save_load() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("hashlist"));

        let manifest = sample();
        store.save(&manifest).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, manifest);
    }

    #[tokio::test]
    async fn test_store_save_overwrites() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("hashlist"));

        store.save(&sample()).await.unwrap();
        store.save(&Manifest::new()).await.unwrap();

        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_load_missing() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("hashlist"));

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, WatchError::PathNotFound(_)));
    }

    #[tokio::test]
    async fn test_store_save_missing_parent() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("gone").join("hashlist"));

        let err = store.save(&sample()).await.unwrap_err();
        assert!(matches!(err, WatchError::ManifestUnavailable(_)));
    }

    #[tokio::test]
    async fn test_store_load_missing_parent() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("gone").join("hashlist"));

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, WatchError::ManifestUnavailable(_)));
    }

    #[tokio::test]
    async fn test_store_init_preserves_existing() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join(".runtimedir").join("hashlist"));

        store.init().await.unwrap();
        assert!(store.load().await.unwrap().is_empty());

        store.save(&sample()).await.unwrap();
        store.init().await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 2);
    }
}
