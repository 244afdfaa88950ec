pub mod merge;
pub mod planner;

pub use merge::{merge, MergeOutcome};
pub use planner::{PlannerOptions, RunSummary, SymbolReport, SyncMode, SyncPlanner, SyncStatus};
