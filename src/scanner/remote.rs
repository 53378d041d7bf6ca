//! Remote listing → snapshot

use crate::filter::IgnoreRuleSet;
use crate::hash::hash_bytes;
use crate::transport::{RemoteDigest, RemoteEntry};
use crate::types::{RelPath, Side, Snapshot, SnapshotEntry};
use std::time::Instant;
use tracing::{info, warn};

/// Build the remote snapshot from a transport listing.
///
/// Paths are normalized the same way as local ones. Entries whose path is
/// empty or escapes the project are skipped with a warning.
pub fn build_remote(listing: Vec<RemoteEntry>, rule_set: &IgnoreRuleSet) -> Snapshot {
    let start_time = Instant::now();
    let mut snapshot = Snapshot::new(Side::Remote);

    for entry in listing {
        let Some(path) = RelPath::parse(&entry.path) else {
            warn!(path = %entry.path, "skipping remote entry with unusable path");
            continue;
        };
        if rule_set.is_ignored(&path, false) {
            snapshot.increment_ignored();
            continue;
        }

        let fingerprint = match &entry.digest {
            RemoteDigest::Fingerprint(fingerprint) => *fingerprint,
            RemoteDigest::Content(content) => hash_bytes(content),
        };
        if snapshot.contains(&path) {
            warn!(%path, "remote listing names the same path twice, keeping the last entry");
        }

        let mut snapshot_entry = SnapshotEntry::new(fingerprint, entry.size);
        if let Some(modified) = entry.modified {
            snapshot_entry = snapshot_entry.with_modified(modified);
        }
        snapshot.insert(path, snapshot_entry);
    }

    snapshot.set_scan_duration(start_time.elapsed());
    info!(
        files = snapshot.len(),
        ignored = snapshot.ignored,
        "remote snapshot built"
    );
    snapshot
}
