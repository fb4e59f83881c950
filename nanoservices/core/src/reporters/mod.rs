//! Reporters bundle listeners for cross-cutting observation.
//!
//! A reporter is attached while the job is being constructed, before any
//! user code can register listeners, and its listeners always run ahead of
//! user listeners for the same event.

pub mod history;
pub mod log;
pub mod metrics;

use crate::engine::JobHandle;

pub use history::HistoryReporter;
pub use log::LogReporter;
pub use metrics::MetricsReporter;

pub trait Reporter: Send + Sync {
    fn name(&self) -> &str;

    /// Register listeners on the job.
    fn attach(&self, job: &JobHandle);
}
