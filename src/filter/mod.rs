//! Ignore filter
//!
//! Compiles `.olignore`-style patterns into an [`IgnoreRuleSet`]:
//!
//! - `*` and `?` never cross a `/`; `**` does
//! - a trailing `/` restricts a pattern to directories
//! - a leading `!` re-includes what an earlier pattern excluded (last match wins)
//! - a leading `/` or an inner `/` anchors the pattern to the project root;
//!   otherwise it is tested against every path segment
//!
//! An ignored directory excludes everything beneath it. Control files
//! registered with [`IgnoreRuleSet::protect`] and temp files left by an
//! interrupted atomic write are always ignored and cannot be re-included.

use crate::executor::PART_SUFFIX;
use crate::types::{map_fs_error, RelPath, SyncError};
use globset::{GlobBuilder, GlobMatcher};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Clone)]
struct Rule {
    matcher: GlobMatcher,
    negate: bool,
    dir_only: bool,
    anchored: bool,
}

impl Rule {
    fn parse(raw: &str) -> Result<Self, SyncError> {
        let mut pattern = raw;
        let negate = pattern.starts_with('!');
        if negate {
            pattern = &pattern[1..];
        }
        let dir_only = pattern.ends_with('/');
        if dir_only {
            pattern = pattern.trim_end_matches('/');
        }
        let rooted = pattern.starts_with('/');
        if rooted {
            pattern = pattern.trim_start_matches('/');
        }
        if pattern.is_empty() {
            return Err(SyncError::Pattern {
                pattern: raw.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }
        let anchored = rooted || pattern.contains('/');

        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| SyncError::Pattern {
                pattern: raw.to_string(),
                reason: e.to_string(),
            })?
            .compile_matcher();

        Ok(Self {
            matcher,
            negate,
            dir_only,
            anchored,
        })
    }

    fn matches(&self, candidate: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.anchored {
            self.matcher.is_match(candidate)
        } else {
            let basename = candidate.rsplit('/').next().unwrap_or(candidate);
            self.matcher.is_match(basename)
        }
    }
}

/// Ordered, compiled ignore patterns plus always-ignored control paths.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRuleSet {
    rules: Vec<Rule>,
    protected: BTreeSet<RelPath>,
}

impl IgnoreRuleSet {
    /// Rule set that ignores nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Always ignore `path` (and everything beneath it, if it is a directory).
    pub fn protect(&mut self, path: RelPath) {
        self.protected.insert(path);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.protected.is_empty()
    }

    /// Test a path against the rule set.
    ///
    /// Every ancestor directory is checked first; an ignored ancestor
    /// ignores the path regardless of later negations.
    pub fn is_ignored(&self, path: &RelPath, is_dir: bool) -> bool {
        let full = path.as_str();
        if !is_dir && full.ends_with(PART_SUFFIX) {
            return true;
        }
        let mut prefix_end = 0;
        for segment in path.segments() {
            let end = prefix_end + segment.len();
            let prefix = &full[..end];
            let is_last = end == full.len();
            let prefix_is_dir = if is_last { is_dir } else { true };

            if self.protected.iter().any(|p| p.as_str() == prefix) {
                return true;
            }
            if self.decide(prefix, prefix_is_dir) {
                return true;
            }
            prefix_end = end + 1;
        }
        false
    }

    /// Last matching rule wins; no match means "keep".
    fn decide(&self, candidate: &str, is_dir: bool) -> bool {
        let mut ignored = false;
        for rule in &self.rules {
            if rule.matches(candidate, is_dir) {
                ignored = !rule.negate;
            }
        }
        ignored
    }
}

/// Compile ordered patterns into a rule set.
///
/// Blank lines and `#` comments are skipped so raw ignore-file lines can be
/// passed through unchanged.
pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<IgnoreRuleSet, SyncError> {
    let mut rule_set = IgnoreRuleSet::empty();
    for raw in patterns {
        let line = raw.as_ref().trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        rule_set.rules.push(Rule::parse(line)?);
    }
    Ok(rule_set)
}

/// Convenience wrapper matching the free-function form of the contract.
pub fn is_ignored(path: &RelPath, is_dir: bool, rule_set: &IgnoreRuleSet) -> bool {
    rule_set.is_ignored(path, is_dir)
}

/// Read an ignore file into an ordered pattern list.
///
/// A missing file yields an empty list; comments and blank lines are dropped.
pub fn load_patterns(path: &Path) -> Result<Vec<String>, SyncError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(map_fs_error(path, e)),
    };

    Ok(content
        .lines()
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect())
}
