//! Fingerprint store
//!
//! Persists the fingerprint of every path as of the last successful sync.
//! This is the merge base of the three-way comparison, so a store that
//! exists but cannot be read is a hard error: treating it as empty would
//! make every file look new on both sides.

use crate::filter::IgnoreRuleSet;
use crate::hash::FileFingerprint;
use crate::types::{map_fs_error, RelPath, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const STORE_VERSION: u32 = 1;

/// Path → fingerprint recorded at the end of the last successful sync.
pub type SyncedState = BTreeMap<RelPath, FileFingerprint>;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    files: SyncedState,
}

/// Owner of the persisted [`SyncedState`].
#[derive(Debug)]
pub struct FingerprintStore {
    path: PathBuf,
    state: SyncedState,
    dirty: bool,
}

impl FingerprintStore {
    /// Load the store at `path`.
    ///
    /// A missing file yields an empty state (first run). A file that exists
    /// but cannot be parsed fails with [`SyncError::CorruptStore`].
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(store = %path.display(), "no fingerprint store yet, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(map_fs_error(path, e)),
        };

        let parsed: StoreFile =
            serde_json::from_slice(&raw).map_err(|e| SyncError::CorruptStore {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if parsed.version != STORE_VERSION {
            return Err(SyncError::CorruptStore {
                path: path.to_path_buf(),
                reason: format!(
                    "unsupported store version {} (expected {})",
                    parsed.version, STORE_VERSION
                ),
            });
        }

        debug!(store = %path.display(), entries = parsed.files.len(), "loaded fingerprint store");
        Ok(Self {
            path: path.to_path_buf(),
            state: parsed.files,
            dirty: false,
        })
    }

    /// In-memory store that will persist to `path` on first flush.
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            state: SyncedState::new(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &SyncedState {
        &self.state
    }

    pub fn get(&self, path: &RelPath) -> Option<FileFingerprint> {
        self.state.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn record(&mut self, path: RelPath, fingerprint: FileFingerprint) {
        if self.state.insert(path, fingerprint) != Some(fingerprint) {
            self.dirty = true;
        }
    }

    pub fn remove(&mut self, path: &RelPath) {
        if self.state.remove(path).is_some() {
            self.dirty = true;
        }
    }

    /// Drop entries for paths the rule set now ignores. Returns how many were dropped.
    pub fn retain_unignored(&mut self, rule_set: &IgnoreRuleSet) -> usize {
        let before = self.state.len();
        self.state.retain(|path, _| !rule_set.is_ignored(path, false));
        let dropped = before - self.state.len();
        if dropped > 0 {
            self.dirty = true;
        }
        dropped
    }

    /// Persist the store atomically if anything changed since the last flush.
    ///
    /// Writes `<store>.part`, syncs it to disk, then renames it over the store,
    /// so an interrupted flush leaves the previous version intact.
    pub fn flush(&mut self) -> Result<(), SyncError> {
        if !self.dirty {
            return Ok(());
        }

        let body = StoreFile {
            version: STORE_VERSION,
            files: self.state.clone(),
        };
        let json = serde_json::to_vec_pretty(&body).map_err(|e| {
            SyncError::Io(std::io::Error::new(ErrorKind::InvalidData, e.to_string()))
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| map_fs_error(parent, e))?;
            }
        }

        let part_path = part_path(&self.path);
        let mut part_file = File::create(&part_path).map_err(|e| map_fs_error(&part_path, e))?;
        part_file
            .write_all(&json)
            .map_err(|e| map_fs_error(&part_path, e))?;
        part_file
            .sync_all()
            .map_err(|e| map_fs_error(&part_path, e))?;
        drop(part_file);

        fs::rename(&part_path, &self.path).map_err(|e| map_fs_error(&self.path, e))?;
        self.dirty = false;
        Ok(())
    }
}

/// Temporary file used while flushing `store_path`.
pub fn part_path(store_path: &Path) -> PathBuf {
    let mut name = store_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    store_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::compile;
    use crate::hash::hash_bytes;
    use tempfile::TempDir;

    fn rel(path: &str) -> RelPath {
        RelPath::parse(path).unwrap()
    }

    #[test]
    fn test_missing_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FingerprintStore::load(&dir.path().join(".olhash")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_flush_then_load_preserves_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".olhash");

        let mut store = FingerprintStore::load(&path).unwrap();
        store.record(rel("main.tex"), hash_bytes(b"v1"));
        store.record(rel("chapters/intro.tex"), hash_bytes(b"intro"));
        store.flush().unwrap();

        let reloaded = FingerprintStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(&rel("main.tex")), Some(hash_bytes(b"v1")));
        assert!(!part_path(&path).exists(), "temp file must be renamed away");
    }

    #[test]
    fn test_garbage_store_is_corrupt_not_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".olhash");
        fs::write(&path, b"\x80\x04garbage-from-an-old-format").unwrap();

        let err = FingerprintStore::load(&path).unwrap_err();
        assert!(matches!(err, SyncError::CorruptStore { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_bad_fingerprint_hex_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".olhash");
        fs::write(&path, r#"{"version":1,"files":{"a.tex":"nothex"}}"#).unwrap();

        let err = FingerprintStore::load(&path).unwrap_err();
        assert!(matches!(err, SyncError::CorruptStore { .. }));
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".olhash");
        fs::write(&path, r#"{"version":99,"files":{}}"#).unwrap();

        let err = FingerprintStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported store version 99"));
    }

    #[test]
    fn test_remove_clears_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".olhash");
        let mut store = FingerprintStore::empty(&path);
        store.record(rel("a.tex"), hash_bytes(b"a"));
        store.remove(&rel("a.tex"));
        store.flush().unwrap();

        let reloaded = FingerprintStore::load(&path).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_flush_without_changes_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".olhash");
        let mut store = FingerprintStore::empty(&path);
        store.flush().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_retain_unignored_drops_newly_ignored_paths() {
        let dir = TempDir::new().unwrap();
        let mut store = FingerprintStore::empty(&dir.path().join(".olhash"));
        store.record(rel("main.tex"), hash_bytes(b"m"));
        store.record(rel("main.aux"), hash_bytes(b"x"));
        store.record(rel("build/out.pdf"), hash_bytes(b"p"));

        let rules = compile(&["*.aux", "build/"]).unwrap();
        assert_eq!(store.retain_unignored(&rules), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get(&rel("main.tex")).is_some());
    }

    #[test]
    fn test_part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/p/.olhash")),
            PathBuf::from("/p/.olhash.part")
        );
    }
}
