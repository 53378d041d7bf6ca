//! Core type definitions for olsync

mod action;
mod error;
mod path;
mod snapshot;

pub use action::{
    ConflictDetails, ConflictKind, DeleteMode, Resolution, StateUpdate, SyncAction, SyncMode,
};
pub use error::{map_fs_error, SyncError, TransportError, TransportErrorKind};
pub use path::RelPath;
pub use snapshot::{Side, Snapshot, SnapshotEntry};
