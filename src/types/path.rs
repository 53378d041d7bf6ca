//! RelPath - Canonical relative path used as the join key between trees

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A project-relative path with `/` separators and no `.`/`..` segments.
///
/// Local paths and remote listing paths are both normalized into this form,
/// so equality on `RelPath` is equality of the file across sides.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelPath(String);

impl RelPath {
    /// Normalize a remote-style string path (either separator accepted).
    ///
    /// Returns `None` for empty paths and paths that escape the root.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => return None,
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            None
        } else {
            Some(RelPath(segments.join("/")))
        }
    }

    /// Normalize a filesystem path relative to a sync root.
    pub fn from_path(path: &Path) -> Option<Self> {
        let mut segments: Vec<String> = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        if segments.is_empty() {
            None
        } else {
            Some(RelPath(segments.join("/")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterator over the `/`-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Path of this entry below `root`, using the platform separator.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for segment in self.segments() {
            out.push(segment);
        }
        out
    }

    /// Lower-cased form, used to detect collisions on case-insensitive filesystems.
    pub fn case_folded(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
