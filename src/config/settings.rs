//! Per-project settings file (`.olsync.toml`)

use crate::executor::write_file_atomic;
use crate::types::{map_fs_error, DeleteMode, SyncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// File name of the settings file inside the local root
pub const SETTINGS_FILE: &str = ".olsync.toml";

/// Values remembered between runs. CLI flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectSettings {
    /// Remote project name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Directory-backed remote root, relative to the local root if not absolute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Extra ignore patterns, applied after the ignore file
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_mode: Option<DeleteMode>,
}

impl ProjectSettings {
    pub fn path_in(local_root: &Path) -> PathBuf {
        local_root.join(SETTINGS_FILE)
    }

    /// Load settings from `local_root`; a missing file yields defaults.
    pub fn load(local_root: &Path) -> Result<Self, SyncError> {
        let path = Self::path_in(local_root);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(map_fs_error(&path, e)),
        };

        toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("Invalid {}: {}", path.display(), e)))
    }

    pub fn save(&self, local_root: &Path) -> Result<(), SyncError> {
        let body = toml::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("Cannot serialize settings: {}", e)))?;
        write_file_atomic(&Self::path_in(local_root), body.as_bytes())
    }
}
