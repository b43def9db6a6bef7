//! Run orchestration: session sync, legislator consolidation, table output
//! and mention resolution.

mod error;
pub use error::PipelineError;

pub mod orchestrator;
pub mod resolution;
pub mod summary;

pub use orchestrator::{Orchestrator, SessionPlan};
pub use resolution::resolve_mentions;
pub use summary::{EntityFailureRecord, MentionCounts, RunSummary, UnitFailure};
