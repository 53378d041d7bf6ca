//! Remote project transport
//!
//! The engine only talks to the remote project through [`Transport`]. A
//! transport is bound to one project when it is constructed; session
//! handling, retries and timeouts all live behind this trait and surface to
//! the engine as [`TransportError`].

pub mod directory;
pub mod memory;

use crate::hash::FileFingerprint;
use crate::types::{RelPath, TransportError};
use chrono::{DateTime, Utc};

pub use directory::DirectoryTransport;
pub use memory::MemoryTransport;

/// How a listing entry identifies its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDigest {
    /// The service already supplied a fingerprint
    Fingerprint(FileFingerprint),
    /// The listing ships the bytes (e.g. a project archive); hash them
    Content(Vec<u8>),
}

/// One file in the remote project listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Path as reported by the service, normalized later
    pub path: String,
    pub digest: RemoteDigest,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn with_fingerprint(path: impl Into<String>, fingerprint: FileFingerprint, size: u64) -> Self {
        Self {
            path: path.into(),
            digest: RemoteDigest::Fingerprint(fingerprint),
            size,
            modified: None,
        }
    }

    pub fn with_content(path: impl Into<String>, content: Vec<u8>) -> Self {
        let size = content.len() as u64;
        Self {
            path: path.into(),
            digest: RemoteDigest::Content(content),
            size,
            modified: None,
        }
    }
}

/// Operations the sync engine needs from the remote side.
///
/// Implementations must be safe to call from several transfer workers at
/// once; the executor never issues two concurrent operations for the same path.
pub trait Transport: Send + Sync {
    /// Every file currently in the project.
    fn list_remote_files(&self) -> Result<Vec<RemoteEntry>, TransportError>;

    fn download(&self, path: &RelPath) -> Result<Vec<u8>, TransportError>;

    /// Create or replace the remote file at `path`.
    fn upload(&self, path: &RelPath, content: &[u8]) -> Result<(), TransportError>;

    fn delete_remote(&self, path: &RelPath) -> Result<(), TransportError>;
}
