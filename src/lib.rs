//! # olsync - two-way sync for Overleaf-style projects
//!
//! Keeps a local directory and a remote project in step. Every run
//! snapshots both sides, compares them against the fingerprints recorded at
//! the end of the previous run, and propagates only what changed. Paths
//! changed differently on both sides are conflicts, resolved per path.

pub mod commands;
pub mod config;
pub mod diff;
pub mod executor;
pub mod filter;
pub mod hash;
pub mod logging;
pub mod resolve;
pub mod scanner;
pub mod store;
pub mod transport;
pub mod types;
pub mod ui;

pub use commands::{sync_project, SyncOptions, SyncOutcome};
pub use config::Config;
pub use executor::SyncReport;
pub use transport::Transport;
pub use types::{RelPath, SyncAction, SyncError, SyncMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
