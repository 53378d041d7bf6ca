//! Atomic local writes

use crate::types::{map_fs_error, SyncError};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Suffix of the temporary file an atomic write renames into place.
///
/// Leftovers from an interrupted write are never synced.
pub const PART_SUFFIX: &str = ".olsync-part";

/// Write `content` to `dest` atomically using the write-then-rename strategy
///
/// 1. Write to a temporary `<name>.olsync-part` file next to `dest`
/// 2. Flush and sync to disk
/// 3. Rename over the final destination
///
/// A crash at any point leaves either the old file or the new one, never a
/// truncated mix.
///
/// # Example
/// ```no_run
/// use olsync::executor::write_file_atomic;
/// use std::path::Path;
///
/// write_file_atomic(Path::new("project/main.tex"), b"\\documentclass{article}")?;
/// # Ok::<(), olsync::types::SyncError>(())
/// ```
pub fn write_file_atomic(dest: &Path, content: &[u8]) -> Result<(), SyncError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| map_fs_error(parent, e))?;
    }

    let mut part_name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    part_name.push(PART_SUFFIX);
    let part_path = dest.with_file_name(part_name);

    let result = (|| {
        let mut part_file = File::create(&part_path).map_err(|e| map_fs_error(&part_path, e))?;
        part_file
            .write_all(content)
            .map_err(|e| map_fs_error(&part_path, e))?;
        part_file
            .sync_all()
            .map_err(|e| map_fs_error(&part_path, e))?;

        // Drop the file handle before rename (required on Windows)
        drop(part_file);

        // Atomic on POSIX systems (single syscall)
        fs::rename(&part_path, dest).map_err(|e| map_fs_error(dest, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&part_path);
    }
    result
}

/// Remove now-empty directories from `removed_file`'s parent up to (not including) `root`.
pub fn prune_empty_parents(removed_file: &Path, root: &Path) {
    let mut current = removed_file.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        // Fails (and stops) as soon as a directory still has entries.
        if fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}
