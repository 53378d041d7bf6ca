//! Trash-based local deletes
//!
//! Local files removed by a sync are moved under `.olsync_trash/<timestamp>/`
//! with their relative paths preserved. A manifest is updated for recovery.

use super::write::write_file_atomic;
use crate::types::{map_fs_error, RelPath, SyncError};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Directory (relative to the local root) holding trashed files
pub const TRASH_DIR: &str = ".olsync_trash";

/// Serializes manifest updates across delete workers.
static MANIFEST_LOCK: Mutex<()> = Mutex::new(());

/// Represents a single deleted file in the trash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedFile {
    /// Relative path from the local root (original location)
    pub original_path: String,
    /// Relative path inside the snapshot directory
    pub trash_path: String,
    /// RFC 3339 timestamp when the file was deleted
    pub deleted_at: String,
    /// File size in bytes
    pub size: u64,
}

/// Manifest file that tracks all deleted files in a trash snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrashManifest {
    pub files: Vec<DeletedFile>,
}

/// Move a local file to trash instead of permanently deleting it
///
/// Files trashed within the same second are grouped under one timestamp
/// directory. Returns the path the file now lives at.
///
/// The original file is never removed unless the trashed copy exists, and
/// is left in place when the snapshot's manifest cannot be read.
pub fn move_to_trash(local_root: &Path, relative_path: &RelPath) -> Result<PathBuf, SyncError> {
    let target_path = relative_path.to_fs_path(local_root);
    let timestamp = Local::now().format("%Y-%m-%d_%H%M%S").to_string();

    let trash_root = local_root.join(TRASH_DIR).join(&timestamp);
    let trash_file_path = relative_path.to_fs_path(&trash_root);
    let manifest_path = trash_root.join("MANIFEST.json");

    if let Some(parent) = trash_file_path.parent() {
        fs::create_dir_all(parent).map_err(|e| map_fs_error(parent, e))?;
    }

    // Held across the move so concurrent deletes append to one manifest in turn.
    let _guard = MANIFEST_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut manifest = load_manifest(&manifest_path)?;

    let metadata = fs::symlink_metadata(&target_path).map_err(|e| map_fs_error(&target_path, e))?;

    match fs::rename(&target_path, &trash_file_path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            fs::copy(&target_path, &trash_file_path)
                .map_err(|e| map_fs_error(&trash_file_path, e))?;
            fs::remove_file(&target_path).map_err(|e| map_fs_error(&target_path, e))?;
        }
        Err(e) => return Err(map_fs_error(&target_path, e)),
    }

    manifest.files.push(DeletedFile {
        original_path: relative_path.to_string(),
        trash_path: relative_path.to_string(),
        deleted_at: Local::now().to_rfc3339(),
        size: metadata.len(),
    });
    let manifest_json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| SyncError::Io(Error::new(ErrorKind::InvalidData, e.to_string())))?;
    write_file_atomic(&manifest_path, manifest_json.as_bytes())?;

    Ok(trash_file_path)
}

/// A missing manifest is empty; one that does not parse is an error.
fn load_manifest(manifest_path: &Path) -> Result<TrashManifest, SyncError> {
    match fs::read_to_string(manifest_path) {
        Ok(content) => serde_json::from_str(&content).map_err(|e| {
            SyncError::Io(Error::new(
                ErrorKind::InvalidData,
                format!("unreadable trash manifest {}: {}", manifest_path.display(), e),
            ))
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(TrashManifest::default()),
        Err(e) => Err(map_fs_error(manifest_path, e)),
    }
}
