use async_trait::async_trait;
use rowflow_utils::RowflowResult;

pub use crate::job::runner::{Flow, Pull};

/// A source of rows.
///
/// `process` acquires the underlying data and hands it over one row at a
/// time through [`Pull::row`], awaiting each call before producing the next
/// row. When `Pull::row` answers [`Flow::Stop`] the processor should stop
/// reading and return.
#[async_trait]
pub trait Processor: Send {
    /// Human-readable name for logging and events
    fn name(&self) -> &str;

    /// Maximum number of rows to process. `None` or 0 means unlimited.
    fn row_limit(&self) -> Option<u64> {
        None
    }

    async fn process(&mut self, pull: &mut Pull<'_>) -> RowflowResult<()>;
}
