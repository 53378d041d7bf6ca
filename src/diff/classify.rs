//! Three-way classification against the last synced state

use super::ActionPlan;
use crate::hash::FileFingerprint;
use crate::store::SyncedState;
use crate::types::{ConflictDetails, RelPath, Snapshot, SnapshotEntry, StateUpdate, SyncAction};
use std::collections::BTreeSet;
use tracing::debug;

/// Classify every path in the union of `local`, `remote` and `prior`.
///
/// The returned plan holds exactly one action per path, sorted by path.
pub fn classify(local: &Snapshot, remote: &Snapshot, prior: &SyncedState) -> ActionPlan {
    let paths: BTreeSet<&RelPath> = local
        .paths()
        .chain(remote.paths())
        .chain(prior.keys())
        .collect();

    let mut plan = ActionPlan::new();
    for path in paths {
        if let Some(action) =
            classify_path(path, local.get(path), remote.get(path), prior.get(path).copied())
        {
            plan.add_action(action);
        }
    }

    debug!(
        uploads = plan.stats.upload_count,
        downloads = plan.stats.download_count,
        conflicts = plan.stats.conflict_count,
        "classified {} paths",
        plan.len()
    );
    plan
}

/// Decide the action for a single path.
///
/// Fingerprint equality is the only notion of "unchanged". A side that was
/// deleted propagates its delete only if the other side still matches
/// `prior`; otherwise the path is a conflict. Returns `None` only when the
/// path is absent everywhere.
pub fn classify_path(
    path: &RelPath,
    local: Option<&SnapshotEntry>,
    remote: Option<&SnapshotEntry>,
    prior: Option<FileFingerprint>,
) -> Option<SyncAction> {
    let path = path.clone();
    let conflict = |path: RelPath| {
        SyncAction::Conflict(ConflictDetails {
            path,
            local: local.cloned(),
            remote: remote.cloned(),
            prior,
        })
    };

    let action = match (local.map(|e| e.fingerprint), remote.map(|e| e.fingerprint), prior) {
        // Same content on both sides, whether untouched or converged independently
        (Some(l), Some(r), _) if l == r => SyncAction::Skip {
            path,
            state: if prior == Some(l) {
                StateUpdate::Keep
            } else {
                StateUpdate::Record(l)
            },
        },
        (Some(l), Some(r), Some(p)) => {
            if l == p {
                SyncAction::Download {
                    path,
                    fingerprint: r,
                }
            } else if r == p {
                SyncAction::Upload {
                    path,
                    fingerprint: l,
                }
            } else {
                conflict(path)
            }
        }
        // Created on both sides with different content
        (Some(_), Some(_), None) => conflict(path),

        (Some(l), None, None) => SyncAction::Upload {
            path,
            fingerprint: l,
        },
        (None, Some(r), None) => SyncAction::Download {
            path,
            fingerprint: r,
        },

        (Some(l), None, Some(p)) if l == p => SyncAction::DeleteLocal(path),
        (None, Some(r), Some(p)) if r == p => SyncAction::DeleteRemote(path),
        // Deleted on one side, modified on the other
        (Some(_), None, Some(_)) | (None, Some(_), Some(_)) => conflict(path),

        (None, None, Some(_)) => SyncAction::Skip {
            path,
            state: StateUpdate::Remove,
        },
        (None, None, None) => return None,
    };
    Some(action)
}
