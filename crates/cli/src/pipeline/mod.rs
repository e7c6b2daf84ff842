//! Pipeline orchestration module.

mod guard;
mod orchestrator;
mod stats;

pub use guard::SessionGuard;
pub use orchestrator::{Pipeline, COMPLETE_MARKER, START_MARKER};
pub use stats::RunReport;
