//! Main sync command

use crate::config::Config;
use crate::diff::{classify, ActionPlan};
use crate::executor::{
    execute_plan, ExecutionCallback, ExecutionContext, ExecutionEvent, SyncReport,
};
use crate::filter::IgnoreRuleSet;
use crate::resolve::{resolve_conflicts, ConflictPrompt, HeadlessPrompt, ResolvedPlan, TerminalPrompt};
use crate::scanner::{build_local_with_progress, build_remote, ProgressCallback};
use crate::store::FingerprintStore;
use crate::transport::{DirectoryTransport, Transport};
use crate::types::{
    ConflictDetails, DeleteMode, RelPath, Side, Snapshot, SyncAction, SyncError, SyncMode,
    TransportErrorKind,
};
use crate::ui::ProgressReporter;
use std::collections::BTreeMap;
use std::io::{ErrorKind, IsTerminal};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Engine parameters for one run, independent of how they were configured.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub local_root: PathBuf,
    pub store_path: PathBuf,
    pub mode: SyncMode,
    pub delete_mode: DeleteMode,
    pub jobs: usize,
    pub dry_run: bool,
}

impl SyncOptions {
    /// Bidirectional, sequential, store at `<root>/.olhash`.
    pub fn new(local_root: impl Into<PathBuf>) -> Self {
        let local_root = local_root.into();
        Self {
            store_path: local_root.join(".olhash"),
            local_root,
            mode: SyncMode::default(),
            delete_mode: DeleteMode::default(),
            jobs: 1,
            dry_run: false,
        }
    }

    pub fn mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn delete_mode(mut self, delete_mode: DeleteMode) -> Self {
        self.delete_mode = delete_mode;
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            local_root: config.local_root.clone(),
            store_path: config.store_path.clone(),
            mode: config.mode,
            delete_mode: config.delete_mode,
            jobs: config.jobs,
            dry_run: config.dry_run,
        }
    }
}

/// Both snapshots and the raw classification, before any conflict is resolved.
#[derive(Debug)]
pub struct Classified {
    pub local: Snapshot,
    pub remote: Snapshot,
    pub plan: ActionPlan,
}

/// Result of [`sync_project`].
#[derive(Debug)]
pub struct SyncOutcome {
    pub resolved: ResolvedPlan,
    /// `None` for a dry run
    pub report: Option<SyncReport>,
}

/// Snapshot both sides and classify every path against the store.
///
/// Store entries for paths that became ignored are purged first. The purge
/// is persisted unless this is a dry run. Any failure here is fatal: no
/// plan is built from a partial view of either side.
pub fn scan_and_classify(
    options: &SyncOptions,
    rule_set: &IgnoreRuleSet,
    transport: &dyn Transport,
    store: &mut FingerprintStore,
    on_progress: Option<&ProgressCallback>,
) -> Result<Classified, SyncError> {
    let purged = store.retain_unignored(rule_set);
    if purged > 0 {
        info!(purged, "dropped store entries for ignored paths");
        if !options.dry_run {
            store.flush()?;
        }
    }

    let local = build_local_with_progress(&options.local_root, rule_set, on_progress)?;
    let listing = transport.list_remote_files()?;
    let remote = build_remote(listing, rule_set);
    debug!(local = local.len(), remote = remote.len(), "snapshots built");

    let plan = classify(&local, &remote, store.state());
    info!(
        uploads = plan.stats.upload_count,
        downloads = plan.stats.download_count,
        deletes = plan.stats.delete_local_count + plan.stats.delete_remote_count,
        conflicts = plan.stats.conflict_count,
        "plan classified"
    );
    Ok(Classified {
        local,
        remote,
        plan,
    })
}

/// Optional observers for the stages of [`sync_project_with`].
#[derive(Default)]
pub struct SyncHooks<'a> {
    /// Local scan progress
    pub on_scan: Option<&'a ProgressCallback>,
    /// Both snapshots are built and classified
    pub on_classified: Option<&'a dyn Fn(&Classified)>,
    /// Conflicts are resolved; an error stops the run before execution
    pub on_resolved: Option<&'a dyn Fn(&ResolvedPlan) -> Result<(), SyncError>>,
    /// Execution events
    pub on_event: Option<&'a ExecutionCallback<'a>>,
}

/// Run the whole engine once: snapshot, classify, resolve, execute.
///
/// Deferred conflicts are added to the report. A dry run resolves with
/// `prompt` as well but never touches either side or the store.
pub fn sync_project(
    options: &SyncOptions,
    rule_set: &IgnoreRuleSet,
    transport: Arc<dyn Transport>,
    prompt: &mut dyn ConflictPrompt,
) -> Result<SyncOutcome, SyncError> {
    sync_project_with(options, rule_set, transport, prompt, &SyncHooks::default())
}

/// [`sync_project`] with stage observers.
pub fn sync_project_with(
    options: &SyncOptions,
    rule_set: &IgnoreRuleSet,
    transport: Arc<dyn Transport>,
    prompt: &mut dyn ConflictPrompt,
    hooks: &SyncHooks<'_>,
) -> Result<SyncOutcome, SyncError> {
    let mut store = FingerprintStore::load(&options.store_path)?;
    let classified = scan_and_classify(
        options,
        rule_set,
        transport.as_ref(),
        &mut store,
        hooks.on_scan,
    )?;
    if let Some(on_classified) = hooks.on_classified {
        on_classified(&classified);
    }

    let resolved = resolve_conflicts(classified.plan, options.mode, prompt);
    if let Some(on_resolved) = hooks.on_resolved {
        on_resolved(&resolved)?;
    }

    if options.dry_run {
        return Ok(SyncOutcome {
            resolved,
            report: None,
        });
    }

    let ctx = ExecutionContext {
        local_root: options.local_root.clone(),
        transport,
        delete_mode: options.delete_mode,
        jobs: options.jobs,
    };
    let mut report = execute_plan(&resolved.plan, &ctx, &mut store, hooks.on_event)?;
    merge_deferred(&mut report, &resolved.deferred);

    Ok(SyncOutcome {
        resolved,
        report: Some(report),
    })
}

/// Run the sync command against the configured directory remote.
///
/// Returns `None` for a dry run.
pub fn run(config: &Config) -> Result<Option<SyncReport>, SyncError> {
    let remote_root = config.remote_root.as_deref().ok_or_else(|| {
        SyncError::Config(
            "No remote configured; pass --remote <DIR> or set `remote` in .olsync.toml"
                .to_string(),
        )
    })?;
    let transport: Arc<dyn Transport> =
        Arc::new(DirectoryTransport::open(remote_root, &config.project)?);
    let rule_set = config.build_rule_set()?;
    let options = SyncOptions::from(config);

    let reporter = Arc::new(Mutex::new(ProgressReporter::new()));
    if let Ok(progress) = reporter.lock() {
        progress.start_scan("local tree");
    }
    let scan_progress = {
        let reporter = Arc::clone(&reporter);
        move |files: u64, bytes: u64| {
            if let Ok(progress) = reporter.lock() {
                progress.update_scan("local tree", files, bytes);
            }
        }
    };
    let on_classified = |classified: &Classified| {
        if let Ok(progress) = reporter.lock() {
            progress.finish_scan(classified.local.len(), classified.remote.len());
        }
    };

    // Set once the plan is resolved, read by the execution callback.
    let action_total = Arc::new(AtomicUsize::new(0));
    let skip_total = Arc::new(AtomicUsize::new(0));
    let on_resolved = |resolved: &ResolvedPlan| -> Result<(), SyncError> {
        println!("{}", format_plan_preview(resolved));
        if config.dry_run {
            return Ok(());
        }
        config.persist_project_name()?;

        let actions = executable_count(&resolved.plan);
        action_total.store(actions, Ordering::SeqCst);
        skip_total.store(skip_count(&resolved.plan), Ordering::SeqCst);
        if actions == 0 {
            println!("Nothing to transfer.");
        } else if let Ok(mut progress) = reporter.lock() {
            progress.start_actions(actions as u64);
        }
        Ok(())
    };

    let error_records: Arc<Mutex<Vec<ErrorRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let progress_cb = {
        let reporter = Arc::clone(&reporter);
        let error_records = Arc::clone(&error_records);
        let action_total = Arc::clone(&action_total);
        let skip_total = Arc::clone(&skip_total);
        move |event: &ExecutionEvent<'_>| match event {
            ExecutionEvent::ActionStart { action, path, .. } => {
                if let Ok(progress) = reporter.lock() {
                    progress.set_current(action, path);
                }
            }
            ExecutionEvent::ActionSuccess { action, bytes, .. } => {
                if *action != "Skip" {
                    if let Ok(mut progress) = reporter.lock() {
                        progress.complete_action(*bytes);
                    }
                }
            }
            ExecutionEvent::ActionError {
                action,
                path,
                error,
                ..
            } => {
                if let Ok(progress) = reporter.lock() {
                    progress.action_error(action, path, &error.to_string());
                }
                if let Ok(mut records) = error_records.lock() {
                    records.push(ErrorRecord::new(Some(*path), error));
                }
            }
            ExecutionEvent::Complete { stats } => {
                if action_total.load(Ordering::SeqCst) > 0 {
                    if let Ok(progress) = reporter.lock() {
                        progress.finish_actions(
                            stats
                                .completed_actions
                                .saturating_sub(skip_total.load(Ordering::SeqCst)),
                            stats.failed_actions,
                            stats.bytes_transferred,
                        );
                    }
                }
            }
        }
    };

    let hooks = SyncHooks {
        on_scan: Some(&scan_progress),
        on_classified: Some(&on_classified),
        on_resolved: Some(&on_resolved),
        on_event: Some(&progress_cb),
    };
    let mut prompt: Box<dyn ConflictPrompt> = if config.dry_run {
        Box::new(HeadlessPrompt)
    } else {
        select_prompt(config)
    };
    let outcome = sync_project_with(&options, &rule_set, transport, prompt.as_mut(), &hooks)?;

    let Some(report) = outcome.report else {
        println!("{}", format_dry_run_actions(&outcome.resolved));
        println!("Dry-run mode: no changes were made.");
        return Ok(None);
    };

    println!("{}", format_report(&report));
    if let Ok(records) = error_records.lock() {
        if !records.is_empty() {
            println!("{}", format_error_summary(&records));
        }
    }

    Ok(Some(report))
}

/// Interactive only when allowed and stdin is a terminal.
fn select_prompt(config: &Config) -> Box<dyn ConflictPrompt> {
    if config.non_interactive || !std::io::stdin().is_terminal() {
        Box::new(HeadlessPrompt)
    } else {
        Box::new(TerminalPrompt::new())
    }
}

fn merge_deferred(report: &mut SyncReport, deferred: &[ConflictDetails]) {
    report
        .conflicts_deferred
        .extend(deferred.iter().map(|conflict| conflict.path.clone()));
    report.conflicts_deferred.sort();
    report.conflicts_deferred.dedup();
}

fn executable_count(plan: &ActionPlan) -> usize {
    plan.actions.iter().filter(|action| !action.is_skip()).count()
}

fn skip_count(plan: &ActionPlan) -> usize {
    plan.actions.iter().filter(|action| action.is_skip()).count()
}

fn format_plan_preview(resolved: &ResolvedPlan) -> String {
    let stats = &resolved.plan.stats;
    let mut preview = format!(
        "Plan:\n  Upload: {}  Download: {}  Delete local: {}  Delete remote: {}  Unchanged: {}\n  Conflicts deferred: {}",
        stats.upload_count,
        stats.download_count,
        stats.delete_local_count,
        stats.delete_remote_count,
        stats.skip_count,
        resolved.deferred.len()
    );
    if !resolved.dropped.is_empty() {
        preview.push_str(&format!(
            "\n  Held back by --push/--pull: {}",
            resolved.dropped.len()
        ));
    }
    preview
}

fn action_label(action: &SyncAction) -> &'static str {
    match action {
        SyncAction::Upload { .. } => "UPLOAD",
        SyncAction::Download { .. } => "DOWNLOAD",
        SyncAction::DeleteLocal(_) => "DEL-LOCAL",
        SyncAction::DeleteRemote(_) => "DEL-REMOTE",
        SyncAction::Conflict(_) => "CONFLICT",
        SyncAction::Skip { .. } => "SKIP",
    }
}

fn format_dry_run_actions(resolved: &ResolvedPlan) -> String {
    let mut entries: Vec<(&RelPath, String)> = Vec::new();
    let mut skipped = 0usize;
    for action in &resolved.plan.actions {
        if action.is_skip() {
            skipped += 1;
            continue;
        }
        entries.push((action.path(), format!("  {:<11}{}", action_label(action), action.path())));
    }
    for conflict in &resolved.deferred {
        entries.push((
            &conflict.path,
            format!(
                "  {:<11}{} ({})",
                "CONFLICT",
                conflict.path,
                conflict.kind().describe()
            ),
        ));
    }
    entries.sort_by(|a, b| a.0.cmp(b.0));

    if entries.is_empty() && skipped == 0 {
        return "Dry-run actions:\n  (no planned actions)".to_string();
    }

    let mut lines = Vec::with_capacity(entries.len() + 2);
    lines.push("Dry-run actions:".to_string());
    lines.extend(entries.into_iter().map(|(_, line)| line));
    if skipped > 0 {
        lines.push(format!("  ({skipped} unchanged file(s) omitted)"));
    }
    lines.join("\n")
}

fn format_report(report: &SyncReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Sync {}: {} uploaded, {} downloaded, {} deleted, {} unchanged, {} failed",
        if report.aborted.is_some() { "aborted" } else { "complete" },
        report.uploaded.len(),
        report.downloaded.len(),
        report.deleted.len(),
        report.skipped.len(),
        report.failures.len()
    ));

    for path in &report.uploaded {
        lines.push(format!("  {:<11}{}", "UPLOAD", path));
    }
    for path in &report.downloaded {
        lines.push(format!("  {:<11}{}", "DOWNLOAD", path));
    }
    for (path, side) in &report.deleted {
        let label = match side {
            Side::Local => "DEL-LOCAL",
            Side::Remote => "DEL-REMOTE",
        };
        lines.push(format!("  {:<11}{}", label, path));
    }

    if !report.conflicts_deferred.is_empty() {
        lines.push(format!(
            "Deferred conflicts ({}):",
            report.conflicts_deferred.len()
        ));
        for path in &report.conflicts_deferred {
            lines.push(format!("  {}", path));
        }
        lines.push(
            "  Run interactively to choose a side, or use --push / --pull.".to_string(),
        );
    }

    if let Some(reason) = &report.aborted {
        lines.push(format!("Aborted: {}", reason));
        if !report.not_attempted.is_empty() {
            lines.push(format!(
                "  {} action(s) not attempted; they will be retried on the next run.",
                report.not_attempted.len()
            ));
        }
    }
    lines.join("\n")
}

#[derive(Debug)]
struct ErrorRecord {
    kind: &'static str,
    path: Option<RelPath>,
    message: String,
    suggestion: Option<String>,
}

impl ErrorRecord {
    fn new(path: Option<&RelPath>, error: &SyncError) -> Self {
        let (message, suggestion) = humanize_error(error);
        Self {
            kind: error.kind_label(),
            path: path.cloned(),
            message,
            suggestion,
        }
    }
}

fn humanize_error(error: &SyncError) -> (String, Option<String>) {
    match error {
        SyncError::Transport(err) => match err.kind {
            TransportErrorKind::AuthExpired => (
                "The remote session is no longer valid".to_string(),
                Some("Log in again to refresh the session cookie, then re-run.".to_string()),
            ),
            TransportErrorKind::NotFound => (
                "Remote file or project was not found".to_string(),
                Some("Check the project name and that the file still exists remotely.".to_string()),
            ),
            TransportErrorKind::Network => (
                format!("Network request failed: {}", err.message),
                Some("Check your connection and re-run; failed files are retried.".to_string()),
            ),
            TransportErrorKind::Server => (
                format!("Remote service rejected the request: {}", err.message),
                Some("Re-run later. If this keeps happening, check the remote project.".to_string()),
            ),
        },
        SyncError::Io(io) => match io.kind() {
            ErrorKind::NotFound => (
                "File or directory was not found".to_string(),
                Some("Verify the path still exists and retry.".to_string()),
            ),
            ErrorKind::PermissionDenied => (
                "Permission denied while accessing file".to_string(),
                Some("Check file permissions or run with a user that has access.".to_string()),
            ),
            ErrorKind::WriteZero | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => (
                "File transfer was interrupted before completion".to_string(),
                Some("Retry the sync and check disk stability.".to_string()),
            ),
            _ => (
                format!("I/O operation failed: {}", io),
                Some(
                    "Retry the sync. If this keeps happening, check disk health and permissions."
                        .to_string(),
                ),
            ),
        },
        SyncError::PermissionDenied { .. } => (
            "Permission denied while accessing file".to_string(),
            Some("Check file permissions or run with a user that has access.".to_string()),
        ),
        SyncError::NotFound { .. } => (
            "Local file disappeared during the sync".to_string(),
            Some("Re-run the sync to pick up the current state.".to_string()),
        ),
        SyncError::CorruptStore { path, .. } => (
            error.to_string(),
            Some(format!(
                "Inspect or delete {} manually; deleting it makes every file look new.",
                path.display()
            )),
        ),
        SyncError::Snapshot { .. } => (
            error.to_string(),
            Some("Check that the local directory exists and is readable.".to_string()),
        ),
        SyncError::Pattern { .. } => (
            error.to_string(),
            Some("Fix the pattern in the ignore file or --exclude.".to_string()),
        ),
        SyncError::Config(msg) => (msg.clone(), None),
    }
}

fn format_error_summary(records: &[ErrorRecord]) -> String {
    let mut groups: BTreeMap<&'static str, Vec<&ErrorRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.kind).or_default().push(record);
    }

    let mut lines = Vec::new();
    lines.push("Error summary:".to_string());
    for (kind, items) in groups {
        lines.push(format!("  {} ({}):", kind, items.len()));
        for record in items.iter().take(3) {
            lines.push(format!("    - {}", record.message));
            if let Some(path) = &record.path {
                lines.push(format!("      Path: {}", path));
            }
            if let Some(suggestion) = &record.suggestion {
                lines.push(format!("      Try: {}", suggestion));
            }
        }
        if items.len() > 3 {
            lines.push(format!("    - ... {} more", items.len() - 3));
        }
    }
    lines.join("\n")
}
