//! Configuration management
//!
//! Command-line flags are parsed into [`Cli`], merged with the project's
//! settings file and validated into a [`Config`].

mod settings;

pub use settings::{ProjectSettings, SETTINGS_FILE};

use crate::executor::TRASH_DIR;
use crate::filter::{compile, load_patterns, IgnoreRuleSet};
use crate::store::part_path;
use crate::types::{DeleteMode, RelPath, SyncError, SyncMode};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

/// Default number of transfer workers
pub const DEFAULT_JOBS: usize = 4;

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "olsync", version)]
#[command(about = "Two-way sync between a local directory and an Overleaf-style project")]
pub struct Cli {
    /// Local project directory
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Local is authoritative: only upload and delete remotely
    #[arg(long, conflicts_with = "pull")]
    pub push: bool,

    /// Remote is authoritative: only download and delete locally
    #[arg(long)]
    pub pull: bool,

    /// Remote project name (remembered in .olsync.toml)
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    /// Directory holding remote projects (one sub-directory per project)
    #[arg(long)]
    pub remote: Option<PathBuf>,

    /// Session cookie file
    #[arg(long = "store-path", default_value = ".olauth")]
    pub store_path: PathBuf,

    /// Fingerprint store file
    #[arg(long = "hash-path", default_value = ".olhash")]
    pub hash_path: PathBuf,

    /// Ignore-pattern file
    #[arg(short = 'i', long = "olignore", default_value = ".olignore")]
    pub olignore: PathBuf,

    /// Extra ignore pattern (repeatable)
    #[arg(short = 'x', long = "exclude")]
    pub exclude: Vec<String>,

    /// Show the plan without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Never prompt; conflicts are deferred
    #[arg(long)]
    pub non_interactive: bool,

    /// How local deletes are carried out
    #[arg(long, value_enum)]
    pub delete_mode: Option<DeleteMode>,

    /// Parallel transfer workers
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated configuration for one run
#[derive(Debug, Clone)]
pub struct Config {
    /// Local project directory
    pub local_root: PathBuf,

    /// Remote project name
    pub project: String,

    /// True when the project name came from `--name` and should be remembered
    pub remember_project: bool,

    /// Root of the directory-backed remote, if configured
    pub remote_root: Option<PathBuf>,

    pub mode: SyncMode,

    /// Session cookie file, resolved against the local root
    pub cookie_path: PathBuf,

    /// Fingerprint store file, resolved against the local root
    pub store_path: PathBuf,

    /// Ignore file, resolved against the local root
    pub ignore_path: PathBuf,

    /// Patterns applied after the ignore file (settings first, then CLI)
    pub exclude: Vec<String>,

    pub dry_run: bool,
    pub non_interactive: bool,
    pub delete_mode: DeleteMode,
    pub jobs: usize,
    pub verbose: bool,
}

impl TryFrom<Cli> for Config {
    type Error = SyncError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let local_root = cli.dir;
        let settings = ProjectSettings::load(&local_root)?;

        let mode = match (cli.push, cli.pull) {
            (true, true) => {
                return Err(SyncError::Config(
                    "--push and --pull cannot be used together".to_string(),
                ))
            }
            (true, false) => SyncMode::LocalOnly,
            (false, true) => SyncMode::RemoteOnly,
            (false, false) => SyncMode::Bidirectional,
        };

        let jobs = cli.jobs.or(settings.jobs).unwrap_or(DEFAULT_JOBS);
        if jobs == 0 {
            return Err(SyncError::Config("--jobs must be at least 1".to_string()));
        }

        let remember_project = cli.name.is_some();
        let project = match cli.name.or(settings.project) {
            Some(name) if !name.trim().is_empty() => name,
            Some(_) => return Err(SyncError::Config("project name is empty".to_string())),
            None => default_project_name(&local_root)?,
        };

        let remote_root = cli
            .remote
            .or_else(|| settings.remote.map(|remote| resolve(&local_root, &remote)));

        let mut exclude = settings.exclude;
        exclude.extend(cli.exclude);

        Ok(Config {
            cookie_path: resolve(&local_root, &cli.store_path),
            store_path: resolve(&local_root, &cli.hash_path),
            ignore_path: resolve(&local_root, &cli.olignore),
            local_root,
            project,
            remember_project,
            remote_root,
            mode,
            exclude,
            dry_run: cli.dry_run,
            non_interactive: cli.non_interactive,
            delete_mode: cli.delete_mode.or(settings.delete_mode).unwrap_or_default(),
            jobs,
            verbose: cli.verbose,
        })
    }
}

impl Config {
    /// Control files that must never be synced, as paths under the local root.
    ///
    /// Files configured outside the root are not part of the tree and are
    /// left out.
    pub fn implicit_ignores(&self) -> Vec<RelPath> {
        let candidates = [
            self.store_path.clone(),
            part_path(&self.store_path),
            self.cookie_path.clone(),
            self.ignore_path.clone(),
            ProjectSettings::path_in(&self.local_root),
            self.local_root.join(TRASH_DIR),
        ];

        let mut paths: Vec<RelPath> = candidates
            .iter()
            .filter_map(|path| path.strip_prefix(&self.local_root).ok())
            .filter_map(RelPath::from_path)
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Ignore file patterns, then extra excludes, plus the protected control files.
    pub fn build_rule_set(&self) -> Result<IgnoreRuleSet, SyncError> {
        let mut patterns = load_patterns(&self.ignore_path)?;
        patterns.extend(self.exclude.iter().cloned());

        let mut rule_set = compile(&patterns)?;
        for path in self.implicit_ignores() {
            rule_set.protect(path);
        }
        Ok(rule_set)
    }

    /// Remember the project name given on the command line.
    pub fn persist_project_name(&self) -> Result<(), SyncError> {
        if !self.remember_project {
            return Ok(());
        }
        let mut settings = ProjectSettings::load(&self.local_root)?;
        if settings.project.as_deref() == Some(self.project.as_str()) {
            return Ok(());
        }
        settings.project = Some(self.project.clone());
        settings.save(&self.local_root)
    }
}

fn resolve(local_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        local_root.join(path)
    }
}

/// The local directory's own name.
fn default_project_name(local_root: &Path) -> Result<String, SyncError> {
    let canonical = fs::canonicalize(local_root).unwrap_or_else(|_| local_root.to_path_buf());
    canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            SyncError::Config(format!(
                "Cannot derive a project name from {}; pass --name",
                local_root.display()
            ))
        })
}
