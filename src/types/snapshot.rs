//! Snapshot - Fresh path → fingerprint mapping for one side of the sync

use super::RelPath;
use crate::hash::FileFingerprint;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Which tree an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}

/// A single file in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub fingerprint: FileFingerprint,

    /// File size in bytes
    pub size: u64,

    /// Modification context shown to the operator. Never used for change detection.
    pub modified: Option<DateTime<Utc>>,
}

impl SnapshotEntry {
    pub fn new(fingerprint: FileFingerprint, size: u64) -> Self {
        Self {
            fingerprint,
            size,
            modified: None,
        }
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }
}

/// Path → entry mapping for one side, rebuilt every run and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub side: Side,

    /// Map: relative_path → SnapshotEntry
    pub entries: BTreeMap<RelPath, SnapshotEntry>,

    /// Aggregate statistics
    pub total_size: u64,
    pub total_dirs: usize,

    /// Number of entries dropped by the ignore filter
    pub ignored: usize,

    pub scan_duration: Duration,
}

impl Snapshot {
    /// Create a new empty snapshot
    pub fn new(side: Side) -> Self {
        Self {
            side,
            entries: BTreeMap::new(),
            total_size: 0,
            total_dirs: 0,
            ignored: 0,
            scan_duration: Duration::from_secs(0),
        }
    }

    /// Insert an entry, adjusting size statistics if the path was already present.
    pub fn insert(&mut self, path: RelPath, entry: SnapshotEntry) {
        if let Some(old_entry) = self.entries.get(&path) {
            self.total_size = self.total_size.saturating_sub(old_entry.size);
        }

        self.total_size += entry.size;
        self.entries.insert(path, entry);
    }

    pub fn get(&self, path: &RelPath) -> Option<&SnapshotEntry> {
        self.entries.get(path)
    }

    pub fn fingerprint(&self, path: &RelPath) -> Option<FileFingerprint> {
        self.entries.get(path).map(|entry| entry.fingerprint)
    }

    pub fn contains(&self, path: &RelPath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelPath, &SnapshotEntry)> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &RelPath> {
        self.entries.keys()
    }

    pub fn set_scan_duration(&mut self, duration: Duration) {
        self.scan_duration = duration;
    }

    pub fn increment_dirs(&mut self) {
        self.total_dirs += 1;
    }

    pub fn increment_ignored(&mut self) {
        self.ignored += 1;
    }
}
