pub mod error;

use error::Error;
use futures_util::stream::BoxStream;
use serde_json::Value;

pub type RowflowResult<T> = Result<T, Error>;

/// Error type for failures that stay scoped to one destination or listener.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One unit of input handed over by a processor. The engine never looks inside.
pub type Row = Value;

/// A value produced from a row by a destination's record generator.
pub type Record = Value;

/// Lazily generated records for one row.
pub type RecordStream = BoxStream<'static, Result<Record, BoxError>>;
