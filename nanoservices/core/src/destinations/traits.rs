use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use rowflow_utils::{BoxError, Record, RecordStream, Row};
use serde_json::Value;

/// Batching behaviour of a destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestinationConfig {
    /// Records per batch. 0 buffers everything until the end of the job.
    pub batch_size: usize,
    /// Transform batches but never hand them to `load_batch`.
    pub disable_load: bool,
}

impl DestinationConfig {
    pub fn batched(batch_size: usize) -> Self {
        Self { batch_size, disable_load: false }
    }
}

/// A sink that receives rows from a job.
///
/// Only `name` and `load_batch` are required. By default each row becomes
/// one record and a batch is loaded as a JSON array of its records.
#[async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> DestinationConfig {
        DestinationConfig::default()
    }

    /// Lazily produce zero or more records from one row.
    fn generate_records(&self, row: &Row) -> RecordStream {
        records(vec![row.clone()])
    }

    /// Turn a full batch into the payload to load. `Ok(None)` skips the load.
    async fn transform_batch(&self, rows: &[Record]) -> Result<Option<Value>, BoxError> {
        Ok(Some(Value::Array(rows.to_vec())))
    }

    async fn load_batch(&self, data: Value) -> Result<(), BoxError>;
}

/// A record stream over already-computed records.
pub fn records(items: Vec<Record>) -> RecordStream {
    stream::iter(items.into_iter().map(Ok)).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct CollectingDestination {
        loaded: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Destination for CollectingDestination {
        fn name(&self) -> &str { "collector" }
        async fn load_batch(&self, data: Value) -> Result<(), BoxError> {
            self.loaded.lock().unwrap().push(data);
            Ok(())
        }
    }

    #[tokio::test]
    async fn defaults_pass_rows_through() {
        let dest = CollectingDestination { loaded: Mutex::new(Vec::new()) };
        assert_eq!(dest.config(), DestinationConfig::default());

        let generated: Vec<_> = dest.generate_records(&json!({"id": 1})).collect().await;
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].as_ref().unwrap(), &json!({"id": 1}));

        let data = dest.transform_batch(&[json!(1), json!(2)]).await.unwrap();
        assert_eq!(data, Some(json!([1, 2])));

        dest.load_batch(json!([1, 2])).await.unwrap();
        assert_eq!(dest.loaded.lock().unwrap().len(), 1);
    }
}
