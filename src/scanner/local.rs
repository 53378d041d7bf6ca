//! Local directory walker

use crate::filter::IgnoreRuleSet;
use crate::hash::compute_hash;
use crate::types::{RelPath, Side, Snapshot, SnapshotEntry, SyncError};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Callback for reporting scan progress
///
/// Arguments:
/// - `files_scanned`: Total number of files fingerprinted so far
/// - `bytes_scanned`: Total bytes fingerprinted so far
pub type ProgressCallback = dyn Fn(u64, u64) + Send + Sync;

/// Snapshot the local tree under `root_path`.
pub fn build_local(root_path: &Path, rule_set: &IgnoreRuleSet) -> Result<Snapshot, SyncError> {
    build_local_with_progress(root_path, rule_set, None)
}

/// Snapshot the local tree, reporting progress as files are hashed.
///
/// Ignored directories are pruned: the walker never descends into them.
/// Only regular files are recorded; symlinks and special files are skipped.
///
/// # Errors
/// * [`SyncError::Snapshot`] if the root is missing, not a directory, or
///   unreadable, and also if any entry below it cannot be read. A file that
///   silently dropped out of the snapshot would look like a local delete.
pub fn build_local_with_progress(
    root_path: &Path,
    rule_set: &IgnoreRuleSet,
    on_progress: Option<&ProgressCallback>,
) -> Result<Snapshot, SyncError> {
    let start_time = Instant::now();
    check_root(root_path)?;

    let mut snapshot = Snapshot::new(Side::Local);
    let ignored = Arc::new(AtomicUsize::new(0));

    let walker = {
        let root = root_path.to_path_buf();
        let rules = rule_set.clone();
        let ignored = Arc::clone(&ignored);
        ignore::WalkBuilder::new(root_path)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                let keep = match relative_to(&root, entry.path()) {
                    Some(rel) => !rules.is_ignored(&rel, is_dir),
                    // The root itself
                    None => true,
                };
                if !keep {
                    ignored.fetch_add(1, Ordering::Relaxed);
                }
                keep
            })
            .build()
    };

    let mut scanned_count: u64 = 0;
    let mut scanned_bytes: u64 = 0;

    for result in walker {
        let entry = result.map_err(|e| snapshot_error(root_path, walk_error(e)))?;

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            if entry.depth() > 0 {
                snapshot.increment_dirs();
            }
            continue;
        }
        if !file_type.is_file() {
            debug!(path = %entry.path().display(), "skipping non-regular file");
            continue;
        }

        let Some(relative_path) = relative_to(root_path, entry.path()) else {
            continue;
        };

        let metadata = entry
            .metadata()
            .map_err(|e| snapshot_error(entry.path(), walk_error(e)))?;
        let fingerprint = compute_hash(entry.path()).map_err(|e| match e {
            SyncError::Io(source) => snapshot_error(entry.path(), source),
            other => snapshot_error(entry.path(), Error::other(other.to_string())),
        })?;

        let mut snapshot_entry = SnapshotEntry::new(fingerprint, metadata.len());
        if let Ok(mtime) = metadata.modified() {
            snapshot_entry = snapshot_entry.with_modified(DateTime::<Utc>::from(mtime));
        }
        snapshot.insert(relative_path, snapshot_entry);

        scanned_count += 1;
        scanned_bytes += metadata.len();
        if let Some(callback) = on_progress {
            callback(scanned_count, scanned_bytes);
        }
    }

    for _ in 0..ignored.load(Ordering::Relaxed) {
        snapshot.increment_ignored();
    }
    snapshot.set_scan_duration(start_time.elapsed());

    info!(
        files = snapshot.len(),
        dirs = snapshot.total_dirs,
        ignored = snapshot.ignored,
        "local snapshot built in {:?}",
        snapshot.scan_duration
    );
    Ok(snapshot)
}

fn check_root(root_path: &Path) -> Result<(), SyncError> {
    let metadata = fs::metadata(root_path).map_err(|e| snapshot_error(root_path, e))?;
    if !metadata.is_dir() {
        return Err(snapshot_error(
            root_path,
            Error::other("not a directory"),
        ));
    }
    fs::read_dir(root_path).map_err(|e| snapshot_error(root_path, e))?;
    Ok(())
}

fn relative_to(root: &Path, path: &Path) -> Option<RelPath> {
    path.strip_prefix(root).ok().and_then(RelPath::from_path)
}

fn walk_error(error: ignore::Error) -> Error {
    match error.into_io_error() {
        Some(io) => io,
        None => Error::other("directory traversal failed"),
    }
}

fn snapshot_error(path: &Path, source: Error) -> SyncError {
    SyncError::Snapshot {
        path: PathBuf::from(path),
        source,
    }
}
