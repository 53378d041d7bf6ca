//! ActionPlan - the per-path outcome of classification

use crate::types::SyncAction;

/// Ordered list of actions, at most one per path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionPlan {
    /// List of sync actions to execute
    pub actions: Vec<SyncAction>,

    /// Aggregate statistics about the plan
    pub stats: PlanStats,
}

impl ActionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a plan from actions, sorted by path.
    pub fn from_actions(actions: impl IntoIterator<Item = SyncAction>) -> Self {
        let mut plan = Self::new();
        for action in actions {
            plan.add_action(action);
        }
        plan.sort_by_path();
        plan
    }

    /// Add an action to the plan and update statistics
    pub fn add_action(&mut self, action: SyncAction) {
        self.stats.count(&action);
        self.actions.push(action);
    }

    /// Sort actions by path so execution and previews are deterministic.
    pub fn sort_by_path(&mut self) {
        self.actions.sort_by(|a, b| a.path().cmp(b.path()));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// True when every action is a Skip.
    pub fn is_all_skip(&self) -> bool {
        self.actions.iter().all(SyncAction::is_skip)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &SyncAction> {
        self.actions.iter().filter(|action| action.is_conflict())
    }
}

/// Per-kind action counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub upload_count: usize,
    pub download_count: usize,
    pub delete_local_count: usize,
    pub delete_remote_count: usize,
    pub skip_count: usize,
    pub conflict_count: usize,
}

impl PlanStats {
    fn count(&mut self, action: &SyncAction) {
        match action {
            SyncAction::Upload { .. } => self.upload_count += 1,
            SyncAction::Download { .. } => self.download_count += 1,
            SyncAction::DeleteLocal(_) => self.delete_local_count += 1,
            SyncAction::DeleteRemote(_) => self.delete_remote_count += 1,
            SyncAction::Skip { .. } => self.skip_count += 1,
            SyncAction::Conflict(_) => self.conflict_count += 1,
        }
    }

    /// Actions that would change either side.
    pub fn change_count(&self) -> usize {
        self.upload_count + self.download_count + self.delete_local_count + self.delete_remote_count
    }
}
