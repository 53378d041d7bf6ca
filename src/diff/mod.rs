//! Diff engine - three-way classification and the resulting plan

mod classify;
mod plan;

pub use classify::{classify, classify_path};
pub use plan::{ActionPlan, PlanStats};
