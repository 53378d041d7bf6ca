//! Directory-backed transport.
//!
//! Treats `<remote_root>/<project>` as the remote project, which is how a
//! mounted share or a git-bridge checkout of the project is synced.

use super::{RemoteEntry, Transport};
use crate::executor::{prune_empty_parents, write_file_atomic};
use crate::hash::compute_hash;
use crate::types::{RelPath, TransportError, TransportErrorKind};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};

/// Remote project stored as a plain directory
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    project_dir: PathBuf,
}

impl DirectoryTransport {
    /// Bind to `project` below `remote_root`.
    ///
    /// Fails with `NotFound` if the project directory does not exist.
    pub fn open(remote_root: &Path, project: &str) -> Result<Self, TransportError> {
        let project_dir = remote_root.join(project);
        if !project_dir.is_dir() {
            return Err(TransportError::not_found(format!(
                "project '{}' not found under {}",
                project,
                remote_root.display()
            )));
        }
        Ok(Self { project_dir })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn walk_error(&self, error: ignore::Error) -> TransportError {
        let path = error_path(&error)
            .and_then(|p| p.strip_prefix(&self.project_dir).ok())
            .and_then(RelPath::from_path);
        let err = TransportError::server(format!("cannot list remote project: {}", error));
        match path {
            Some(rel) => err.at(rel.as_str()),
            None => err,
        }
    }
}

fn error_path(error: &ignore::Error) -> Option<&Path> {
    match error {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Partial(errors) => errors.iter().find_map(error_path),
        _ => None,
    }
}

impl Transport for DirectoryTransport {
    fn list_remote_files(&self) -> Result<Vec<RemoteEntry>, TransportError> {
        let walker = ignore::WalkBuilder::new(&self.project_dir)
            .standard_filters(false)
            .follow_links(false)
            .build();

        let mut listing = Vec::new();
        for result in walker {
            // A partial listing would read as remote deletions.
            let entry = result.map_err(|e| self.walk_error(e))?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let relative = match entry.path().strip_prefix(&self.project_dir) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let Some(rel) = RelPath::from_path(relative) else {
                continue;
            };

            let metadata = entry
                .metadata()
                .map_err(|e| TransportError::server(e.to_string()).at(rel.as_str()))?;
            let fingerprint = compute_hash(entry.path())
                .map_err(|e| TransportError::server(e.to_string()).at(rel.as_str()))?;

            let mut remote = RemoteEntry::with_fingerprint(rel.as_str(), fingerprint, metadata.len());
            remote.modified = metadata.modified().ok().map(DateTime::<Utc>::from);
            listing.push(remote);
        }
        Ok(listing)
    }

    fn download(&self, path: &RelPath) -> Result<Vec<u8>, TransportError> {
        let target = path.to_fs_path(&self.project_dir);
        fs::read(&target).map_err(|e| map_io_error(path, e))
    }

    fn upload(&self, path: &RelPath, content: &[u8]) -> Result<(), TransportError> {
        let target = path.to_fs_path(&self.project_dir);
        write_file_atomic(&target, content)
            .map_err(|e| TransportError::server(e.to_string()).at(path.as_str()))
    }

    fn delete_remote(&self, path: &RelPath) -> Result<(), TransportError> {
        let target = path.to_fs_path(&self.project_dir);
        fs::remove_file(&target).map_err(|e| map_io_error(path, e))?;
        prune_empty_parents(&target, &self.project_dir);
        Ok(())
    }
}

fn map_io_error(path: &RelPath, error: Error) -> TransportError {
    let kind = match error.kind() {
        ErrorKind::NotFound => TransportErrorKind::NotFound,
        _ => TransportErrorKind::Server,
    };
    TransportError::new(kind, error.to_string()).at(path.as_str())
}
