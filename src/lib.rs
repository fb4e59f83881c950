pub use rowflow_core as core;
pub use rowflow_utils as utils;

// Convenience re-exports for common usage
pub use rowflow_core::builder::{BuildError, JobBuilder};
pub use rowflow_core::destinations::traits::{Destination, DestinationConfig};
pub use rowflow_core::engine::{Job, JobHandle, JobOptions};
pub use rowflow_core::events::{Event, EventName, EventPayload};
pub use rowflow_core::job::{FanOut, Flow, Pull};
pub use rowflow_core::processors::traits::Processor;
pub use rowflow_core::reporters::Reporter;
pub use rowflow_utils::{BoxError, Record, RecordStream, Row, RowflowResult};
