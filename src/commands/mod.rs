//! Command implementations

pub mod sync;

pub use sync::{
    run, scan_and_classify, sync_project, sync_project_with, Classified, SyncHooks, SyncOptions,
    SyncOutcome,
};
