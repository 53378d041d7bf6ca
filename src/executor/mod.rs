//! Executor module: applies a resolved action plan
//!
//! Deletes run before transfers. Each action goes through the transport or
//! the local filesystem, and only a successful action touches the
//! fingerprint store, which is flushed right after every update.

pub mod pool;
pub mod trash;
pub mod write;

use crate::diff::ActionPlan;
use crate::hash::{hash_bytes, FileFingerprint};
use crate::store::FingerprintStore;
use crate::transport::Transport;
use crate::types::{
    map_fs_error, DeleteMode, RelPath, Side, StateUpdate, SyncAction, SyncError, TransportError,
    TransportErrorKind,
};
use pool::{JobResult, TransferJob, TransferPool, WorkFn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use trash::{move_to_trash, TRASH_DIR};
pub use write::{prune_empty_parents, write_file_atomic, PART_SUFFIX};

/// Everything the executor needs besides the plan and the store.
#[derive(Clone)]
pub struct ExecutionContext {
    pub local_root: PathBuf,
    pub transport: Arc<dyn Transport>,
    pub delete_mode: DeleteMode,
    /// Transfer workers; `<= 1` runs sequentially on the calling thread
    pub jobs: usize,
}

/// Side effect of a successful action, applied to the store by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Both sides now hold content with this fingerprint
    Recorded {
        fingerprint: FileFingerprint,
        bytes: u64,
    },
    /// The path no longer exists on either side
    Removed,
}

/// Execution progress statistics for a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Number of actions in the input plan.
    pub total_actions: usize,
    /// Number of successfully processed actions (skips included).
    pub completed_actions: usize,
    /// Number of failed actions.
    pub failed_actions: usize,
    /// Bytes moved by uploads and downloads.
    pub bytes_transferred: u64,
}

/// Events emitted while executing a plan.
#[derive(Debug)]
pub enum ExecutionEvent<'a> {
    /// Action execution started. Only emitted by the sequential path.
    ActionStart {
        index: usize,
        total: usize,
        action: &'static str,
        path: &'a RelPath,
    },
    ActionSuccess {
        index: usize,
        total: usize,
        action: &'static str,
        path: &'a RelPath,
        bytes: u64,
    },
    /// Action failed; the executor carries on with the rest of the plan.
    ActionError {
        index: usize,
        total: usize,
        action: &'static str,
        path: &'a RelPath,
        error: &'a SyncError,
    },
    Complete { stats: &'a ExecutionStats },
}

/// Optional callback used to receive execution events.
pub type ExecutionCallback<'f> = dyn for<'a> Fn(&ExecutionEvent<'a>) + Send + Sync + 'f;

/// A planned action that did not succeed.
#[derive(Debug)]
pub struct FailedAction {
    pub path: RelPath,
    pub action: &'static str,
    pub error: SyncError,
}

/// Why the remaining plan was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The remote session is no longer valid
    SessionExpired(TransportError),
    /// The fingerprint store could not be persisted
    StoreWrite(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::SessionExpired(err) => write!(f, "session expired: {}", err.message),
            AbortReason::StoreWrite(reason) => {
                write!(f, "could not write fingerprint store: {}", reason)
            }
        }
    }
}

/// Outcome of one sync run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub uploaded: Vec<RelPath>,
    pub downloaded: Vec<RelPath>,
    pub deleted: Vec<(RelPath, Side)>,
    pub skipped: Vec<RelPath>,
    pub conflicts_deferred: Vec<RelPath>,
    pub failures: Vec<FailedAction>,
    /// Actions never started because the run was aborted
    pub not_attempted: Vec<RelPath>,
    pub aborted: Option<AbortReason>,
    pub stats: ExecutionStats,
}

impl SyncReport {
    /// No failures and no abort. Deferred conflicts do not count against a run.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }

    pub fn deleted_on(&self, side: Side) -> impl Iterator<Item = &RelPath> {
        self.deleted
            .iter()
            .filter(move |(_, s)| *s == side)
            .map(|(path, _)| path)
    }

    /// Number of paths that changed on either side.
    pub fn changed_count(&self) -> usize {
        self.uploaded.len() + self.downloaded.len() + self.deleted.len()
    }
}

/// Execute a resolved plan
///
/// Skips are applied to the store first, then all deletes, then all
/// transfers. Per-file failures are collected into the report and the run
/// continues; session expiry stops the remaining plan and is reported in
/// [`SyncReport::aborted`]. Any `Conflict` still present in the plan is
/// treated as deferred and never executed.
///
/// Returns `Err` only when the executor itself cannot run (for example the
/// transfer pool cannot be created).
pub fn execute_plan(
    plan: &ActionPlan,
    ctx: &ExecutionContext,
    store: &mut FingerprintStore,
    on_event: Option<&ExecutionCallback<'_>>,
) -> Result<SyncReport, SyncError> {
    let total = plan.actions.len();
    let mut coordinator = Coordinator {
        store,
        report: SyncReport {
            stats: ExecutionStats {
                total_actions: total,
                ..Default::default()
            },
            ..Default::default()
        },
        cancel: Arc::new(AtomicBool::new(false)),
        on_event,
        total,
    };

    let mut deletes = Vec::new();
    let mut transfers = Vec::new();
    for (idx, action) in plan.actions.iter().enumerate() {
        let index = idx + 1;
        match action {
            SyncAction::Skip { path, state } => coordinator.apply_skip(index, path, *state),
            SyncAction::Conflict(details) => {
                warn!(path = %details.path, "unresolved conflict deferred");
                coordinator.report.conflicts_deferred.push(details.path.clone());
            }
            _ if action.is_delete() => deletes.push(TransferJob {
                index,
                action: action.clone(),
            }),
            _ => transfers.push(TransferJob {
                index,
                action: action.clone(),
            }),
        }
    }

    let transfers = coordinator.reject_case_collisions(transfers);

    let worker = Worker {
        local_root: ctx.local_root.clone(),
        transport: Arc::clone(&ctx.transport),
        delete_mode: ctx.delete_mode,
    };
    let pool = if ctx.jobs > 1 && deletes.len() + transfers.len() > 1 {
        Some(TransferPool::new(ctx.jobs, ctx.jobs * 2)?)
    } else {
        None
    };

    for (phase, jobs) in [("delete", deletes), ("transfer", transfers)] {
        if jobs.is_empty() {
            continue;
        }
        if coordinator.is_cancelled() {
            coordinator.skip_remaining(&jobs);
            continue;
        }

        info!(phase, actions = jobs.len(), "executing phase");
        match &pool {
            Some(pool) => run_parallel(pool, jobs, &worker, &mut coordinator)?,
            None => run_sequential(jobs, &worker, &mut coordinator),
        }
    }

    let mut report = coordinator.report;
    emit_event(
        on_event,
        ExecutionEvent::Complete {
            stats: &report.stats,
        },
    );
    report.failures.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(report)
}

fn run_sequential(jobs: Vec<TransferJob>, worker: &Worker, coordinator: &mut Coordinator<'_>) {
    for job in jobs {
        if coordinator.is_cancelled() {
            coordinator.report.not_attempted.push(job.action.path().clone());
            continue;
        }

        emit_event(
            coordinator.on_event,
            ExecutionEvent::ActionStart {
                index: job.index,
                total: coordinator.total,
                action: job.action.action_name(),
                path: job.action.path(),
            },
        );
        let result = worker.perform(&job.action);
        coordinator.apply(job.index, &job.action, result);
    }
}

fn run_parallel(
    pool: &TransferPool,
    jobs: Vec<TransferJob>,
    worker: &Worker,
    coordinator: &mut Coordinator<'_>,
) -> Result<(), SyncError> {
    let planned: Vec<(usize, RelPath)> = jobs
        .iter()
        .map(|job| (job.index, job.action.path().clone()))
        .collect();
    let mut seen = HashSet::with_capacity(planned.len());

    let work: WorkFn = {
        let worker = worker.clone();
        Arc::new(move |action: &SyncAction| worker.perform(action))
    };
    let cancel = Arc::clone(&coordinator.cancel);

    let stats = pool.run(jobs, work, cancel, |outcome| {
        seen.insert(outcome.index);
        match outcome.result {
            JobResult::Done(result) => coordinator.apply(outcome.index, &outcome.action, result),
            JobResult::Cancelled => coordinator
                .report
                .not_attempted
                .push(outcome.action.path().clone()),
        }
    })?;
    debug!(
        workers = stats.workers,
        dispatched = stats.dispatched,
        completed = stats.completed,
        "transfer pool drained"
    );

    for (index, path) in planned {
        if !seen.contains(&index) {
            coordinator.report.not_attempted.push(path);
        }
    }
    Ok(())
}

/// Single writer for the store and the report.
struct Coordinator<'a> {
    store: &'a mut FingerprintStore,
    report: SyncReport,
    cancel: Arc<AtomicBool>,
    on_event: Option<&'a ExecutionCallback<'a>>,
    total: usize,
}

impl Coordinator<'_> {
    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn skip_remaining(&mut self, jobs: &[TransferJob]) {
        self.report
            .not_attempted
            .extend(jobs.iter().map(|job| job.action.path().clone()));
    }

    fn apply_skip(&mut self, index: usize, path: &RelPath, state: StateUpdate) {
        match state {
            StateUpdate::Keep => {}
            StateUpdate::Record(fingerprint) => {
                debug!(%path, "both sides converged, recording");
                self.store.record(path.clone(), fingerprint);
                self.flush_store();
            }
            StateUpdate::Remove => {
                debug!(%path, "gone on both sides, forgetting");
                self.store.remove(path);
                self.flush_store();
            }
        }
        self.report.skipped.push(path.clone());
        self.report.stats.completed_actions += 1;
        emit_event(
            self.on_event,
            ExecutionEvent::ActionSuccess {
                index,
                total: self.total,
                action: "Skip",
                path,
                bytes: 0,
            },
        );
    }

    fn apply(&mut self, index: usize, action: &SyncAction, result: Result<Applied, SyncError>) {
        let path = action.path();
        match result {
            Ok(applied) => {
                let bytes = match applied {
                    Applied::Recorded { fingerprint, bytes } => {
                        self.store.record(path.clone(), fingerprint);
                        bytes
                    }
                    Applied::Removed => {
                        self.store.remove(path);
                        0
                    }
                };
                self.flush_store();

                match action {
                    SyncAction::Upload { .. } => self.report.uploaded.push(path.clone()),
                    SyncAction::Download { .. } => self.report.downloaded.push(path.clone()),
                    SyncAction::DeleteLocal(_) => {
                        self.report.deleted.push((path.clone(), Side::Local))
                    }
                    SyncAction::DeleteRemote(_) => {
                        self.report.deleted.push((path.clone(), Side::Remote))
                    }
                    SyncAction::Skip { .. } | SyncAction::Conflict(_) => {}
                }
                self.report.stats.completed_actions += 1;
                self.report.stats.bytes_transferred += bytes;
                debug!(%path, action = action.action_name(), bytes, "action complete");

                emit_event(
                    self.on_event,
                    ExecutionEvent::ActionSuccess {
                        index,
                        total: self.total,
                        action: action.action_name(),
                        path,
                        bytes,
                    },
                );
            }
            Err(err) => {
                error!(%path, action = action.action_name(), "action failed: {}", err);
                self.report.stats.failed_actions += 1;
                emit_event(
                    self.on_event,
                    ExecutionEvent::ActionError {
                        index,
                        total: self.total,
                        action: action.action_name(),
                        path,
                        error: &err,
                    },
                );

                if err.aborts_run() {
                    if let SyncError::Transport(transport) = &err {
                        self.abort(AbortReason::SessionExpired(transport.clone()));
                    }
                }
                self.report.failures.push(FailedAction {
                    path: path.clone(),
                    action: action.action_name(),
                    error: err,
                });
            }
        }
    }

    /// Fail every create whose target folds onto an earlier create on the same side.
    fn reject_case_collisions(&mut self, jobs: Vec<TransferJob>) -> Vec<TransferJob> {
        let mut claimed: HashMap<(Side, String), RelPath> = HashMap::new();
        let mut accepted = Vec::with_capacity(jobs.len());

        for job in jobs {
            let side = match job.action {
                SyncAction::Download { .. } => Side::Local,
                _ => Side::Remote,
            };
            let path = job.action.path().clone();
            let key = (side, path.case_folded());
            let earlier = claimed.get(&key).filter(|first| **first != path).cloned();
            match earlier {
                Some(first) => {
                    let err = SyncError::Config(format!(
                        "'{}' differs from '{}' only by case on the {} side",
                        path, first, side
                    ));
                    self.apply(job.index, &job.action, Err(err));
                }
                None => {
                    claimed.entry(key).or_insert(path);
                    accepted.push(job);
                }
            }
        }
        accepted
    }

    fn flush_store(&mut self) {
        if let Err(err) = self.store.flush() {
            error!("failed to persist fingerprint store: {}", err);
            self.abort(AbortReason::StoreWrite(err.to_string()));
        }
    }

    fn abort(&mut self, reason: AbortReason) {
        self.cancel.store(true, Ordering::SeqCst);
        if self.report.aborted.is_none() {
            warn!("aborting remaining plan: {}", reason);
            self.report.aborted = Some(reason);
        }
    }
}

/// The I/O half of an action. Runs on any thread; never touches the store.
#[derive(Clone)]
struct Worker {
    local_root: PathBuf,
    transport: Arc<dyn Transport>,
    delete_mode: DeleteMode,
}

impl Worker {
    fn perform(&self, action: &SyncAction) -> Result<Applied, SyncError> {
        match action {
            SyncAction::Upload { path, .. } => {
                let source = path.to_fs_path(&self.local_root);
                let content = fs::read(&source).map_err(|e| map_fs_error(&source, e))?;
                self.transport.upload(path, &content)?;
                Ok(Applied::Recorded {
                    fingerprint: hash_bytes(&content),
                    bytes: content.len() as u64,
                })
            }
            SyncAction::Download { path, .. } => {
                let content = self.transport.download(path)?;
                write_file_atomic(&path.to_fs_path(&self.local_root), &content)?;
                Ok(Applied::Recorded {
                    fingerprint: hash_bytes(&content),
                    bytes: content.len() as u64,
                })
            }
            SyncAction::DeleteRemote(path) => match self.transport.delete_remote(path) {
                Ok(()) => Ok(Applied::Removed),
                Err(err) if err.kind == TransportErrorKind::NotFound => {
                    debug!(%path, "remote file already gone");
                    Ok(Applied::Removed)
                }
                Err(err) => Err(err.into()),
            },
            SyncAction::DeleteLocal(path) => {
                delete_local(&self.local_root, path, self.delete_mode).map(|_| Applied::Removed)
            }
            SyncAction::Skip { .. } | SyncAction::Conflict(_) => Err(SyncError::Config(format!(
                "{} is not executable",
                action.action_name()
            ))),
        }
    }
}

/// Delete a local file according to `mode`. A missing file counts as deleted.
fn delete_local(root: &Path, path: &RelPath, mode: DeleteMode) -> Result<(), SyncError> {
    let target = path.to_fs_path(root);
    match fs::symlink_metadata(&target) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(map_fs_error(&target, e)),
    }

    match mode {
        DeleteMode::Trash => {
            move_to_trash(root, path)?;
        }
        DeleteMode::Permanent => match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(map_fs_error(&target, e)),
        },
    }
    prune_empty_parents(&target, root);
    Ok(())
}

fn emit_event(on_event: Option<&ExecutionCallback<'_>>, event: ExecutionEvent<'_>) {
    if let Some(callback) = on_event {
        callback(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use crate::types::ConflictDetails;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn rel(path: &str) -> RelPath {
        RelPath::parse(path).expect("valid path")
    }

    struct Fixture {
        local: TempDir,
        remote: Arc<MemoryTransport>,
        store: FingerprintStore,
    }

    impl Fixture {
        fn new() -> Self {
            let local = TempDir::new().expect("create local tempdir");
            let store = FingerprintStore::empty(&local.path().join(".olhash"));
            Self {
                local,
                remote: Arc::new(MemoryTransport::new()),
                store,
            }
        }

        fn ctx(&self, jobs: usize, delete_mode: DeleteMode) -> ExecutionContext {
            ExecutionContext {
                local_root: self.local.path().to_path_buf(),
                transport: self.remote.clone(),
                delete_mode,
                jobs,
            }
        }

        fn write_local(&self, path: &str, content: &[u8]) {
            let full = self.local.path().join(path);
            fs::create_dir_all(full.parent().expect("parent")).expect("create parent");
            fs::write(full, content).expect("write local file");
        }
    }

    fn plan_of(actions: Vec<SyncAction>) -> ActionPlan {
        let mut plan = ActionPlan::new();
        for action in actions {
            plan.add_action(action);
        }
        plan
    }

    #[test]
    fn test_upload_and_download_record_fingerprints() {
        let mut fx = Fixture::new();
        fx.write_local("main.tex", b"local body");
        fx.remote.put("refs.bib", b"@book{x}");

        let plan = plan_of(vec![
            SyncAction::Download {
                path: rel("refs.bib"),
                fingerprint: hash_bytes(b"@book{x}"),
            },
            SyncAction::Upload {
                path: rel("main.tex"),
                fingerprint: hash_bytes(b"local body"),
            },
        ]);

        let report = execute_plan(&plan, &fx.ctx(1, DeleteMode::Trash), &mut fx.store, None)
            .expect("execute plan");

        assert!(report.is_success());
        assert_eq!(report.uploaded, vec![rel("main.tex")]);
        assert_eq!(report.downloaded, vec![rel("refs.bib")]);
        assert_eq!(fx.remote.get("main.tex").as_deref(), Some(&b"local body"[..]));
        assert_eq!(
            fs::read(fx.local.path().join("refs.bib")).expect("read download"),
            b"@book{x}"
        );
        assert_eq!(fx.store.get(&rel("main.tex")), Some(hash_bytes(b"local body")));
        assert_eq!(fx.store.get(&rel("refs.bib")), Some(hash_bytes(b"@book{x}")));
        assert_eq!(report.stats.bytes_transferred, 18);

        let reloaded = FingerprintStore::load(fx.store.path()).expect("reload store");
        assert_eq!(reloaded.len(), 2, "store must be flushed after each action");
    }

    #[test]
    fn test_failed_action_leaves_store_untouched() {
        let mut fx = Fixture::new();
        let prior = hash_bytes(b"v0");
        fx.store.record(rel("a.tex"), prior);
        fx.write_local("a.tex", b"v1");
        fx.write_local("b.tex", b"b");
        fx.remote.fail_path("a.tex", TransportErrorKind::Server);

        let plan = plan_of(vec![
            SyncAction::Upload {
                path: rel("a.tex"),
                fingerprint: hash_bytes(b"v1"),
            },
            SyncAction::Upload {
                path: rel("b.tex"),
                fingerprint: hash_bytes(b"b"),
            },
        ]);

        let report = execute_plan(&plan, &fx.ctx(1, DeleteMode::Trash), &mut fx.store, None)
            .expect("execute plan");

        assert!(!report.is_success());
        assert!(report.aborted.is_none());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, rel("a.tex"));
        assert_eq!(fx.store.get(&rel("a.tex")), Some(prior));
        assert_eq!(report.uploaded, vec![rel("b.tex")]);
    }

    #[test]
    fn test_auth_expiry_aborts_remaining_actions() {
        let mut fx = Fixture::new();
        for name in ["a.tex", "b.tex", "c.tex"] {
            fx.write_local(name, name.as_bytes());
        }
        fx.remote.expire_session_after(1);

        let plan = plan_of(
            ["a.tex", "b.tex", "c.tex"]
                .iter()
                .map(|name| SyncAction::Upload {
                    path: rel(name),
                    fingerprint: hash_bytes(name.as_bytes()),
                })
                .collect(),
        );

        let report = execute_plan(&plan, &fx.ctx(1, DeleteMode::Trash), &mut fx.store, None)
            .expect("execute plan");

        assert_eq!(report.uploaded, vec![rel("a.tex")]);
        assert!(matches!(report.aborted, Some(AbortReason::SessionExpired(_))));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.not_attempted, vec![rel("c.tex")]);
        assert_eq!(fx.store.len(), 1);
    }

    #[test]
    fn test_deletes_run_before_transfers_and_prune() {
        let mut fx = Fixture::new();
        fx.write_local("old/gone.tex", b"bye");
        fx.store.record(rel("old/gone.tex"), hash_bytes(b"bye"));
        fx.store.record(rel("remote.tex"), hash_bytes(b"r"));
        fx.remote.put("remote.tex", b"r");
        fx.remote.put("new.tex", b"n");

        let plan = plan_of(vec![
            SyncAction::Download {
                path: rel("new.tex"),
                fingerprint: hash_bytes(b"n"),
            },
            SyncAction::DeleteLocal(rel("old/gone.tex")),
            SyncAction::DeleteRemote(rel("remote.tex")),
        ]);

        let order = Arc::new(Mutex::new(Vec::new()));
        let order_ref = Arc::clone(&order);
        let callback = move |event: &ExecutionEvent<'_>| {
            if let ExecutionEvent::ActionSuccess { action, .. } = event {
                order_ref.lock().expect("lock order").push(*action);
            }
        };

        let report = execute_plan(
            &plan,
            &fx.ctx(1, DeleteMode::Permanent),
            &mut fx.store,
            Some(&callback),
        )
        .expect("execute plan");

        assert!(report.is_success());
        assert_eq!(
            *order.lock().expect("lock order"),
            vec!["DeleteLocal", "DeleteRemote", "Download"]
        );
        assert!(!fx.local.path().join("old").exists());
        assert!(fx.remote.get("remote.tex").is_none());
        assert_eq!(report.deleted_on(Side::Local).count(), 1);
        assert_eq!(report.deleted_on(Side::Remote).count(), 1);
        assert!(fx.store.get(&rel("old/gone.tex")).is_none());
        assert!(fx.store.get(&rel("remote.tex")).is_none());
    }

    #[test]
    fn test_delete_local_trash_mode_keeps_a_copy() {
        let mut fx = Fixture::new();
        fx.write_local("draft.tex", b"draft");
        let plan = plan_of(vec![SyncAction::DeleteLocal(rel("draft.tex"))]);

        execute_plan(&plan, &fx.ctx(1, DeleteMode::Trash), &mut fx.store, None)
            .expect("execute plan");

        assert!(!fx.local.path().join("draft.tex").exists());
        assert!(fx.local.path().join(TRASH_DIR).exists());
    }

    #[test]
    fn test_missing_targets_count_as_deleted() {
        let mut fx = Fixture::new();
        let plan = plan_of(vec![
            SyncAction::DeleteLocal(rel("never.tex")),
            SyncAction::DeleteRemote(rel("gone.tex")),
        ]);

        let report = execute_plan(&plan, &fx.ctx(1, DeleteMode::Permanent), &mut fx.store, None)
            .expect("execute plan");
        assert!(report.is_success());
        assert_eq!(report.deleted.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreachable_local_file_is_not_counted_as_deleted() {
        use std::os::unix::fs::PermissionsExt;

        let mut fx = Fixture::new();
        fx.write_local("locked/notes.tex", b"notes");
        fx.store.record(rel("locked/notes.tex"), hash_bytes(b"notes"));
        let locked = fx.local.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");
        if fs::symlink_metadata(locked.join("notes.tex")).is_ok() {
            // Permission bits are not enforced for root.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");
            return;
        }

        let plan = plan_of(vec![SyncAction::DeleteLocal(rel("locked/notes.tex"))]);
        let report = execute_plan(&plan, &fx.ctx(1, DeleteMode::Permanent), &mut fx.store, None)
            .expect("execute plan");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");

        assert!(report.deleted.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].error.is_permission_error());
        assert_eq!(fx.store.get(&rel("locked/notes.tex")), Some(hash_bytes(b"notes")));
        assert!(fx.local.path().join("locked/notes.tex").exists());
    }

    #[test]
    fn test_skip_state_updates_are_applied() {
        let mut fx = Fixture::new();
        fx.store.record(rel("both-gone.tex"), hash_bytes(b"x"));
        let plan = plan_of(vec![
            SyncAction::Skip {
                path: rel("both-gone.tex"),
                state: StateUpdate::Remove,
            },
            SyncAction::Skip {
                path: rel("same.tex"),
                state: StateUpdate::Record(hash_bytes(b"same")),
            },
            SyncAction::skip(rel("untouched.tex")),
        ]);

        let report = execute_plan(&plan, &fx.ctx(1, DeleteMode::Trash), &mut fx.store, None)
            .expect("execute plan");

        assert_eq!(report.skipped.len(), 3);
        assert!(fx.store.get(&rel("both-gone.tex")).is_none());
        assert_eq!(fx.store.get(&rel("same.tex")), Some(hash_bytes(b"same")));
        assert!(fx.store.get(&rel("untouched.tex")).is_none());
    }

    #[test]
    fn test_stray_conflict_is_deferred_not_executed() {
        let mut fx = Fixture::new();
        let plan = plan_of(vec![SyncAction::Conflict(ConflictDetails {
            path: rel("c.tex"),
            local: None,
            remote: None,
            prior: None,
        })]);

        let report = execute_plan(&plan, &fx.ctx(1, DeleteMode::Trash), &mut fx.store, None)
            .expect("execute plan");
        assert_eq!(report.conflicts_deferred, vec![rel("c.tex")]);
        assert_eq!(fx.remote.call_count(), 0);
    }

    #[test]
    fn test_case_folded_collision_fails_second_create() {
        let mut fx = Fixture::new();
        fx.remote.put("Figure.png", b"upper");
        fx.remote.put("figure.png", b"lower");

        let plan = plan_of(vec![
            SyncAction::Download {
                path: rel("Figure.png"),
                fingerprint: hash_bytes(b"upper"),
            },
            SyncAction::Download {
                path: rel("figure.png"),
                fingerprint: hash_bytes(b"lower"),
            },
        ]);

        let report = execute_plan(&plan, &fx.ctx(1, DeleteMode::Trash), &mut fx.store, None)
            .expect("execute plan");

        assert_eq!(report.downloaded, vec![rel("Figure.png")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, rel("figure.png"));
        assert!(matches!(report.failures[0].error, SyncError::Config(_)));
        assert!(fx.store.get(&rel("figure.png")).is_none());
    }

    #[test]
    fn test_parallel_execution_matches_sequential_outcome() {
        let mut fx = Fixture::new();
        let mut actions = Vec::new();
        for i in 0..24 {
            let name = format!("chapter_{i:02}.tex");
            fx.write_local(&name, name.as_bytes());
            actions.push(SyncAction::Upload {
                path: rel(&name),
                fingerprint: hash_bytes(name.as_bytes()),
            });
        }
        fx.remote.fail_path("chapter_07.tex", TransportErrorKind::Network);

        let report = execute_plan(
            &plan_of(actions),
            &fx.ctx(4, DeleteMode::Trash),
            &mut fx.store,
            None,
        )
        .expect("execute plan");

        assert_eq!(report.uploaded.len(), 23);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(fx.store.len(), 23);
        assert!(fx.store.get(&rel("chapter_07.tex")).is_none());
        let reloaded = FingerprintStore::load(fx.store.path()).expect("reload store");
        assert_eq!(reloaded.len(), 23);
    }

    #[test]
    fn test_parallel_auth_expiry_reports_every_action() {
        let mut fx = Fixture::new();
        let mut actions = Vec::new();
        for i in 0..40 {
            let name = format!("f{i:02}.tex");
            fx.write_local(&name, b"x");
            actions.push(SyncAction::Upload {
                path: rel(&name),
                fingerprint: hash_bytes(b"x"),
            });
        }
        fx.remote.expire_session_after(3);

        let report = execute_plan(
            &plan_of(actions),
            &fx.ctx(3, DeleteMode::Trash),
            &mut fx.store,
            None,
        )
        .expect("execute plan");

        assert!(matches!(report.aborted, Some(AbortReason::SessionExpired(_))));
        assert_eq!(
            report.uploaded.len() + report.failures.len() + report.not_attempted.len(),
            40
        );
        assert_eq!(fx.store.len(), report.uploaded.len());
    }
}
