//! SyncAction - Actions determined by the diff classifier

use super::{RelPath, SnapshotEntry};
use crate::hash::FileFingerprint;
use serde::{Deserialize, Serialize};

/// Which directions a run is allowed to propagate changes in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Upload and download; conflicts go to the operator
    #[default]
    Bidirectional,
    /// `--push`: local is authoritative
    LocalOnly,
    /// `--pull`: remote is authoritative
    RemoteOnly,
}

/// How local deletes are carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Move into `.olsync_trash/<timestamp>/`
    #[default]
    Trash,
    /// Remove the file
    Permanent,
}

/// Bookkeeping applied to the fingerprint store when a Skip is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateUpdate {
    /// Nothing to record
    Keep,
    /// Both sides converged on this fingerprint independently
    Record(FileFingerprint),
    /// Path vanished from both sides; forget it
    Remove,
}

/// Both sides of a path that diverged from the last synced state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDetails {
    pub path: RelPath,

    /// Current local version (`None` when deleted locally)
    pub local: Option<SnapshotEntry>,

    /// Current remote version (`None` when deleted remotely)
    pub remote: Option<SnapshotEntry>,

    /// Fingerprint recorded at the last successful sync
    pub prior: Option<FileFingerprint>,
}

/// Shape of a conflict, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Modified differently on both sides
    ModifyModify,
    /// Deleted locally, modified remotely
    DeleteModify,
    /// Modified locally, deleted remotely
    ModifyDelete,
    /// Created on both sides with different content
    CreateCreate,
}

impl ConflictKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ConflictKind::ModifyModify => "modified on both sides",
            ConflictKind::DeleteModify => "deleted locally, modified remotely",
            ConflictKind::ModifyDelete => "modified locally, deleted remotely",
            ConflictKind::CreateCreate => "created on both sides",
        }
    }
}

impl ConflictDetails {
    pub fn kind(&self) -> ConflictKind {
        match (&self.local, &self.remote, self.prior) {
            (None, _, _) => ConflictKind::DeleteModify,
            (_, None, _) => ConflictKind::ModifyDelete,
            (Some(_), Some(_), None) => ConflictKind::CreateCreate,
            (Some(_), Some(_), Some(_)) => ConflictKind::ModifyModify,
        }
    }

    pub fn local_fingerprint(&self) -> Option<FileFingerprint> {
        self.local.as_ref().map(|entry| entry.fingerprint)
    }

    pub fn remote_fingerprint(&self) -> Option<FileFingerprint> {
        self.remote.as_ref().map(|entry| entry.fingerprint)
    }
}

/// Sync action determined by the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Fetch the remote version and overwrite the local file
    Download {
        path: RelPath,
        fingerprint: FileFingerprint,
    },

    /// Send the local version to the remote project
    Upload {
        path: RelPath,
        fingerprint: FileFingerprint,
    },

    /// Remove the local file (deleted remotely, unchanged locally)
    DeleteLocal(RelPath),

    /// Remove the remote file (deleted locally, unchanged remotely)
    DeleteRemote(RelPath),

    /// Nothing to transfer; may still touch the store
    Skip { path: RelPath, state: StateUpdate },

    /// Both sides diverged differently; needs resolution
    Conflict(ConflictDetails),
}

/// Operator (or mode) decision for a single conflicting path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Local wins
    Upload,
    /// Remote wins
    Download,
    /// Leave both sides as they are for this run
    Skip,
}

impl SyncAction {
    pub fn path(&self) -> &RelPath {
        match self {
            SyncAction::Download { path, .. }
            | SyncAction::Upload { path, .. }
            | SyncAction::DeleteLocal(path)
            | SyncAction::DeleteRemote(path)
            | SyncAction::Skip { path, .. } => path,
            SyncAction::Conflict(details) => &details.path,
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            SyncAction::Download { .. } => "Download",
            SyncAction::Upload { .. } => "Upload",
            SyncAction::DeleteLocal(_) => "DeleteLocal",
            SyncAction::DeleteRemote(_) => "DeleteRemote",
            SyncAction::Skip { .. } => "Skip",
            SyncAction::Conflict(_) => "Conflict",
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, SyncAction::Skip { .. })
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, SyncAction::Download { .. } | SyncAction::Upload { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, SyncAction::DeleteLocal(_) | SyncAction::DeleteRemote(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncAction::Conflict(_))
    }

    /// Skip that leaves the store untouched
    pub fn skip(path: RelPath) -> Self {
        SyncAction::Skip {
            path,
            state: StateUpdate::Keep,
        }
    }
}
