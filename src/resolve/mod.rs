//! Conflict resolution and direction filtering
//!
//! Turns a classified plan into an executable one: conflicts are resolved
//! (by mode or by asking the operator) and, in the direction-restricted
//! modes, actions that would write to the authoritative side are dropped.

mod terminal;

pub use terminal::{describe_conflict, parse_choice, TerminalPrompt};

use crate::diff::ActionPlan;
use crate::types::{ConflictDetails, RelPath, Resolution, SyncAction, SyncMode};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Source of per-path conflict decisions.
///
/// `None` means no decision could be obtained and the conflict is deferred.
pub trait ConflictPrompt {
    fn ask(&mut self, conflict: &ConflictDetails) -> Option<Resolution>;
}

/// No operator available: every conflict is deferred.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPrompt;

impl ConflictPrompt for HeadlessPrompt {
    fn ask(&mut self, _conflict: &ConflictDetails) -> Option<Resolution> {
        None
    }
}

/// Answers conflicts from a fixed table; unknown paths are deferred.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompt {
    answers: HashMap<RelPath, Resolution>,
    asked: Vec<RelPath>,
}

impl ScriptedPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, path: &str, resolution: Resolution) -> Self {
        if let Some(path) = RelPath::parse(path) {
            self.answers.insert(path, resolution);
        }
        self
    }

    /// Paths the engine asked about, in order.
    pub fn asked(&self) -> &[RelPath] {
        &self.asked
    }
}

impl ConflictPrompt for ScriptedPrompt {
    fn ask(&mut self, conflict: &ConflictDetails) -> Option<Resolution> {
        self.asked.push(conflict.path.clone());
        self.answers.get(&conflict.path).copied()
    }
}

/// A plan ready for the executor.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPlan {
    /// No `Conflict` actions remain in here
    pub plan: ActionPlan,
    /// Conflicts left for a later run
    pub deferred: Vec<ConflictDetails>,
    /// Actions removed by a direction-restricted mode
    pub dropped: Vec<SyncAction>,
}

/// Resolve conflicts and apply the sync mode's direction filter.
///
/// - `LocalOnly` keeps Upload/DeleteRemote, drops Download/DeleteLocal and
///   resolves every conflict to the local side without asking.
/// - `RemoteOnly` is the mirror image.
/// - `Bidirectional` asks `prompt` once per conflict.
///
/// Dropped and deferred paths are left out of the plan, so the store is not
/// touched for them and they surface again on the next run.
pub fn resolve_conflicts(
    plan: ActionPlan,
    mode: SyncMode,
    prompt: &mut dyn ConflictPrompt,
) -> ResolvedPlan {
    let mut actions = Vec::with_capacity(plan.actions.len());
    let mut deferred = Vec::new();
    let mut dropped = Vec::new();

    for action in plan.actions {
        let resolved = match action {
            SyncAction::Conflict(details) => {
                let decision = match mode {
                    SyncMode::LocalOnly => Some(Resolution::Upload),
                    SyncMode::RemoteOnly => Some(Resolution::Download),
                    SyncMode::Bidirectional => prompt.ask(&details),
                };
                match decision {
                    Some(resolution) => {
                        debug!(path = %details.path, ?resolution, "conflict resolved");
                        apply_resolution(&details, resolution)
                    }
                    None => {
                        warn!(path = %details.path, "conflict deferred");
                        deferred.push(details);
                        continue;
                    }
                }
            }
            other => other,
        };

        if allowed_in_mode(&resolved, mode) {
            actions.push(resolved);
        } else {
            dropped.push(resolved);
        }
    }

    if !dropped.is_empty() {
        info!(count = dropped.len(), "actions outside the sync direction dropped");
    }

    ResolvedPlan {
        plan: ActionPlan::from_actions(actions),
        deferred,
        dropped,
    }
}

/// Turn a resolution into the action that carries it out.
///
/// Choosing a side that no longer has the file propagates the delete.
pub fn apply_resolution(details: &ConflictDetails, resolution: Resolution) -> SyncAction {
    let path = details.path.clone();
    match resolution {
        Resolution::Upload => match details.local_fingerprint() {
            Some(fingerprint) => SyncAction::Upload { path, fingerprint },
            None => SyncAction::DeleteRemote(path),
        },
        Resolution::Download => match details.remote_fingerprint() {
            Some(fingerprint) => SyncAction::Download { path, fingerprint },
            None => SyncAction::DeleteLocal(path),
        },
        Resolution::Skip => SyncAction::skip(path),
    }
}

fn allowed_in_mode(action: &SyncAction, mode: SyncMode) -> bool {
    match mode {
        SyncMode::Bidirectional => true,
        SyncMode::LocalOnly => !matches!(
            action,
            SyncAction::Download { .. } | SyncAction::DeleteLocal(_)
        ),
        SyncMode::RemoteOnly => !matches!(
            action,
            SyncAction::Upload { .. } | SyncAction::DeleteRemote(_)
        ),
    }
}
