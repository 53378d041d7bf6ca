//! Content fingerprints

use crate::types::{map_fs_error, SyncError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Blake3 digest of a file's content.
///
/// Fingerprint equality is the only notion of "unchanged" the engine uses;
/// modification times never participate in change detection.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileFingerprint([u8; 32]);

impl FileFingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form, as persisted in the fingerprint store.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        blake3::Hash::from_hex(hex)
            .ok()
            .map(|hash| Self(*hash.as_bytes()))
    }

    /// First 12 hex digits, for prompts and logs.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Debug for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileFingerprint({})", self.short())
    }
}

impl fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for FileFingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FileFingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FileFingerprint::from_hex(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid fingerprint '{}'", raw)))
    }
}

/// Compute the fingerprint of a file
///
/// The file is streamed in 64KB chunks for memory efficiency.
///
/// # Example
/// ```no_run
/// use olsync::hash::compute_hash;
/// use std::path::Path;
///
/// let fingerprint = compute_hash(Path::new("main.tex"))?;
/// println!("{}", fingerprint);
/// # Ok::<(), olsync::types::SyncError>(())
/// ```
pub fn compute_hash(file_path: &Path) -> Result<FileFingerprint, SyncError> {
    let mut file = File::open(file_path).map_err(|e| map_fs_error(file_path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| map_fs_error(file_path, e))?;

        if bytes_read == 0 {
            break; // EOF
        }

        hasher.update(&buffer[0..bytes_read]);
    }

    Ok(FileFingerprint(*hasher.finalize().as_bytes()))
}

/// Fingerprint of in-memory content (downloads, listings that ship bytes).
pub fn hash_bytes(content: &[u8]) -> FileFingerprint {
    FileFingerprint(*blake3::hash(content).as_bytes())
}
