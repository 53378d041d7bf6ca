//! Error types for olsync

use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure categories reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The session is no longer valid. Aborts the whole run.
    AuthExpired,
    /// The remote path or project does not exist.
    NotFound,
    /// Connection-level failure (timeouts, resets, DNS).
    Network,
    /// The service rejected or failed the request.
    Server,
}

impl TransportErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransportErrorKind::AuthExpired => "auth_expired",
            TransportErrorKind::NotFound => "not_found",
            TransportErrorKind::Network => "network",
            TransportErrorKind::Server => "server",
        }
    }
}

/// Error surfaced by the transport collaborator, propagated unmodified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport error ({}){}: {}", .kind.label(), location_suffix(.path), .message)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub path: Option<String>,
    pub message: String,
}

fn location_suffix(path: &Option<String>) -> String {
    path.as_deref()
        .map(|p| format!(" on {}", p))
        .unwrap_or_default()
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: None,
            message: message.into(),
        }
    }

    /// Attach the relative path the failed operation targeted.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::AuthExpired, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Server, message)
    }

    pub fn is_auth_expired(&self) -> bool {
        self.kind == TransportErrorKind::AuthExpired
    }
}

/// Error types for olsync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local tree could not be enumerated. Fatal before planning.
    #[error("Cannot snapshot local tree at {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: IoError,
    },

    /// Fingerprint store exists but cannot be parsed.
    #[error("Fingerprint store {path} is corrupt: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    /// Remote side failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ignore pattern could not be compiled
    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// Permission denied for specific path
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Local path does not exist
    #[error("Not found: {path}")]
    NotFound { path: PathBuf },

    /// Standard IO error (automatically converted via #[from])
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

impl SyncError {
    /// Errors that stop the run before any action is attempted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Snapshot { .. }
                | SyncError::CorruptStore { .. }
                | SyncError::Config(_)
                | SyncError::Pattern { .. }
        )
    }

    /// Errors that abort the remaining plan once execution has started.
    pub fn aborts_run(&self) -> bool {
        matches!(self, SyncError::Transport(err) if err.is_auth_expired())
    }

    /// Check if this error is related to permissions
    pub fn is_permission_error(&self) -> bool {
        matches!(self, SyncError::PermissionDenied { .. })
    }

    /// Short label used to group errors in summaries.
    pub fn kind_label(&self) -> &'static str {
        match self {
            SyncError::Snapshot { .. } => "Snapshot error",
            SyncError::CorruptStore { .. } => "Corrupt store",
            SyncError::Transport(err) => match err.kind {
                TransportErrorKind::AuthExpired => "Session expired",
                TransportErrorKind::NotFound => "Remote not found",
                TransportErrorKind::Network => "Network error",
                TransportErrorKind::Server => "Server error",
            },
            SyncError::Config(_) => "Configuration error",
            SyncError::Pattern { .. } => "Pattern error",
            SyncError::PermissionDenied { .. } => "Permission denied",
            SyncError::NotFound { .. } => "Not found",
            SyncError::Io(_) => "I/O error",
        }
    }
}

/// Map a filesystem error so permission and not-found cases stay distinct.
pub fn map_fs_error(path: &Path, error: IoError) -> SyncError {
    match error.kind() {
        ErrorKind::PermissionDenied => SyncError::PermissionDenied {
            path: path.to_path_buf(),
        },
        ErrorKind::NotFound => SyncError::NotFound {
            path: path.to_path_buf(),
        },
        _ => SyncError::Io(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_automatic_conversion() {
        let io_error = IoError::new(ErrorKind::Other, "disk on fire");
        let err: SyncError = io_error.into();

        assert!(matches!(err, SyncError::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_map_fs_error_keeps_permission_and_not_found_distinct() {
        let path = Path::new("/project/main.tex");

        let denied = map_fs_error(path, IoError::new(ErrorKind::PermissionDenied, "no"));
        assert!(denied.is_permission_error());
        assert!(denied.to_string().contains("/project/main.tex"));

        let missing = map_fs_error(path, IoError::new(ErrorKind::NotFound, "gone"));
        assert!(matches!(missing, SyncError::NotFound { .. }));

        let other = map_fs_error(path, IoError::new(ErrorKind::Interrupted, "eintr"));
        assert!(matches!(other, SyncError::Io(_)));
    }

    #[test]
    fn test_transport_error_display_includes_kind_and_path() {
        let err = TransportError::network("connection reset").at("chapters/intro.tex");
        let text = err.to_string();
        assert!(text.contains("network"));
        assert!(text.contains("chapters/intro.tex"));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn test_only_auth_expiry_aborts_run() {
        let expired: SyncError = TransportError::auth_expired("cookie rejected").into();
        assert!(expired.aborts_run());

        for kind in [
            TransportErrorKind::NotFound,
            TransportErrorKind::Network,
            TransportErrorKind::Server,
        ] {
            let err: SyncError = TransportError::new(kind, "x").into();
            assert!(!err.aborts_run(), "{:?} must not abort", kind);
        }
        assert!(!SyncError::Config("bad".into()).aborts_run());
    }

    #[test]
    fn test_is_fatal() {
        assert!(SyncError::CorruptStore {
            path: PathBuf::from(".olhash"),
            reason: "eof".into()
        }
        .is_fatal());
        assert!(SyncError::Snapshot {
            path: PathBuf::from("/missing"),
            source: IoError::new(ErrorKind::NotFound, "gone"),
        }
        .is_fatal());
        assert!(!SyncError::from(TransportError::server("500")).is_fatal());
        assert!(!SyncError::PermissionDenied {
            path: PathBuf::from("a")
        }
        .is_fatal());
    }

    #[test]
    fn test_kind_labels_for_transport_kinds() {
        let err: SyncError = TransportError::auth_expired("x").into();
        assert_eq!(err.kind_label(), "Session expired");
        let err: SyncError = TransportError::not_found("x").into();
        assert_eq!(err.kind_label(), "Remote not found");
    }
}
