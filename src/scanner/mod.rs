//! Tree snapshot builders
//!
//! Both sides are reduced to the same shape, a [`Snapshot`](crate::types::Snapshot)
//! of relative path → fingerprint, filtered by the same rule set.

mod local;
mod remote;

pub use local::{build_local, build_local_with_progress, ProgressCallback};
pub use remote::build_remote;
