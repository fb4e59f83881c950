use std::sync::Arc;

use futures_util::StreamExt;
use rowflow_utils::{Record, Row};

use crate::destinations::traits::{Destination, DestinationConfig};
use crate::events::event::EventPayload;
use crate::job::state::JobShared;

/// Per-destination batching state machine.
///
/// Owns the destination's current batch; nothing else reads or writes it.
pub struct BatchEngine {
    index: usize,
    destination: Arc<dyn Destination>,
    config: DestinationConfig,
    current_batch: Vec<Record>,
}

impl BatchEngine {
    pub fn new(index: usize, destination: Arc<dyn Destination>, config: DestinationConfig) -> Self {
        Self {
            index,
            destination,
            config,
            current_batch: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        self.destination.name()
    }

    pub fn config(&self) -> DestinationConfig {
        self.config
    }

    /// Records buffered but not yet flushed.
    pub fn pending(&self) -> usize {
        self.current_batch.len()
    }

    fn is_full(&self) -> bool {
        self.config.batch_size > 0 && self.current_batch.len() >= self.config.batch_size
    }

    /// Generate records for one row, flushing each time the batch fills up.
    ///
    /// A generation error drops the rest of this row for this destination only.
    pub async fn accept_row(&mut self, row: &Row, shared: &JobShared) {
        let mut records = self.destination.generate_records(row);

        while let Some(next) = records.next().await {
            match next {
                Ok(record) => {
                    shared
                        .emit(EventPayload::RowGenerated {
                            destination: self.index,
                            record: record.clone(),
                        })
                        .await;
                    self.current_batch.push(record);
                    if self.is_full() {
                        self.flush(shared).await;
                    }
                }
                Err(e) => {
                    tracing::debug!(destination = %self.name(), error = %e, "record generation failed");
                    shared
                        .emit(EventPayload::RowGenerationError {
                            destination: self.index,
                            row: row.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    break;
                }
            }
        }
    }

    /// Flush whatever is left once the source is exhausted or the job stopped.
    pub async fn finalize(&mut self, shared: &JobShared) {
        if !self.current_batch.is_empty() {
            self.flush(shared).await;
        }
    }

    async fn flush(&mut self, shared: &JobShared) {
        let index = self.index;
        let rows = std::mem::take(&mut self.current_batch);

        shared
            .emit(EventPayload::TransformingBatch { destination: index, rows: rows.clone() })
            .await;

        let data = match self.destination.transform_batch(&rows).await {
            Ok(data) => {
                shared
                    .emit(EventPayload::TransformedBatch { destination: index, data: data.clone() })
                    .await;
                data
            }
            Err(e) => {
                tracing::warn!(destination = %self.name(), error = %e, "batch transform failed, batch dropped");
                shared
                    .emit(EventPayload::TransformingBatchError {
                        destination: index,
                        rows,
                        error: e.to_string(),
                    })
                    .await;
                None
            }
        };

        shared.emit(EventPayload::EndTransformingBatch { destination: index }).await;

        if self.config.disable_load {
            return;
        }
        let Some(data) = data else { return };

        shared
            .emit(EventPayload::LoadingBatch { destination: index, data: data.clone() })
            .await;

        match self.destination.load_batch(data.clone()).await {
            Ok(()) => {
                shared.emit(EventPayload::LoadedBatch { destination: index, data }).await;
            }
            Err(e) => {
                tracing::warn!(destination = %self.name(), error = %e, "batch load failed, batch dropped");
                shared
                    .emit(EventPayload::LoadingBatchError {
                        destination: index,
                        data,
                        error: e.to_string(),
                    })
                    .await;
            }
        }

        shared.emit(EventPayload::EndLoadingBatch { destination: index }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destinations::traits::records;
    use crate::events::bus::ListenerGroup;
    use crate::events::event::{EventName, JobContext};
    use crate::events::listener::Listener;
    use async_trait::async_trait;
    use futures_util::stream;
    use rowflow_utils::{BoxError, RecordStream};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestDestination {
        config: DestinationConfig,
        loaded: Mutex<Vec<Value>>,
        fail_loads: bool,
        fail_transform: bool,
    }

    #[async_trait]
    impl Destination for TestDestination {
        fn name(&self) -> &str { "test" }

        fn generate_records(&self, row: &Row) -> RecordStream {
            // Each row n expands to n copies of itself, row 0 fails midway.
            match row.as_u64() {
                Some(0) => stream::iter(vec![
                    Ok(json!("partial")),
                    Err::<Value, BoxError>("generator failed".into()),
                    Ok(json!("never")),
                ])
                .boxed(),
                Some(n) => records(vec![row.clone(); n as usize]),
                None => records(vec![row.clone()]),
            }
        }

        async fn transform_batch(&self, rows: &[Record]) -> Result<Option<Value>, BoxError> {
            if self.fail_transform {
                return Err("transform failed".into());
            }
            Ok(Some(Value::Array(rows.to_vec())))
        }

        async fn load_batch(&self, data: Value) -> Result<(), BoxError> {
            if self.fail_loads {
                return Err("sink unavailable".into());
            }
            self.loaded.lock().unwrap().push(data);
            Ok(())
        }
    }

    fn recorded_names(shared: &JobShared) -> Arc<Mutex<Vec<EventName>>> {
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = names.clone();
        shared.bus.on_any(
            ListenerGroup::User,
            Listener::payload(move |payload| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(payload.name());
                    Ok(())
                }
            }),
        );
        names
    }

    #[tokio::test]
    async fn flushes_when_batch_fills_mid_row() {
        let shared = JobShared::new(JobContext::new(None));
        let dest = Arc::new(TestDestination { config: DestinationConfig::batched(2), ..Default::default() });
        let mut engine = BatchEngine::new(0, dest.clone(), dest.config);

        engine.accept_row(&json!(3), &shared).await;
        assert_eq!(engine.pending(), 1);
        assert_eq!(*dest.loaded.lock().unwrap(), vec![json!([3, 3])]);

        engine.finalize(&shared).await;
        assert_eq!(engine.pending(), 0);
        assert_eq!(dest.loaded.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn generation_error_keeps_earlier_records_and_drops_the_rest() {
        let shared = JobShared::new(JobContext::new(None));
        let names = recorded_names(&shared);
        let dest = Arc::new(TestDestination::default());
        let mut engine = BatchEngine::new(0, dest.clone(), dest.config);

        engine.accept_row(&json!(0), &shared).await;
        assert_eq!(engine.pending(), 1);
        assert_eq!(
            *names.lock().unwrap(),
            vec![EventName::RowGenerated, EventName::RowGenerationError]
        );
    }

    #[tokio::test]
    async fn failed_load_is_reported_and_batch_reset() {
        let shared = JobShared::new(JobContext::new(None));
        let names = recorded_names(&shared);
        let dest = Arc::new(TestDestination {
            config: DestinationConfig::batched(1),
            fail_loads: true,
            ..Default::default()
        });
        let mut engine = BatchEngine::new(0, dest.clone(), dest.config);

        engine.accept_row(&json!("a"), &shared).await;
        assert_eq!(engine.pending(), 0);
        assert_eq!(
            *names.lock().unwrap(),
            vec![
                EventName::RowGenerated,
                EventName::TransformingBatch,
                EventName::TransformedBatch,
                EventName::EndTransformingBatch,
                EventName::LoadingBatch,
                EventName::LoadingBatchError,
                EventName::EndLoadingBatch,
            ]
        );
    }

    #[tokio::test]
    async fn transform_error_skips_load() {
        let shared = JobShared::new(JobContext::new(None));
        let names = recorded_names(&shared);
        let dest = Arc::new(TestDestination { fail_transform: true, ..Default::default() });
        let mut engine = BatchEngine::new(0, dest.clone(), dest.config);

        engine.accept_row(&json!("a"), &shared).await;
        engine.finalize(&shared).await;

        assert!(dest.loaded.lock().unwrap().is_empty());
        assert_eq!(
            *names.lock().unwrap(),
            vec![
                EventName::RowGenerated,
                EventName::TransformingBatch,
                EventName::TransformingBatchError,
                EventName::EndTransformingBatch,
            ]
        );
    }

    #[tokio::test]
    async fn disabled_load_still_transforms() {
        let shared = JobShared::new(JobContext::new(None));
        let names = recorded_names(&shared);
        let dest = Arc::new(TestDestination::default());
        let config = DestinationConfig { batch_size: 0, disable_load: true };
        let mut engine = BatchEngine::new(0, dest.clone(), config);

        engine.accept_row(&json!("a"), &shared).await;
        engine.accept_row(&json!("b"), &shared).await;
        assert_eq!(engine.pending(), 2);
        engine.finalize(&shared).await;

        assert!(dest.loaded.lock().unwrap().is_empty());
        let names = names.lock().unwrap();
        assert!(names.contains(&EventName::TransformedBatch));
        assert!(!names.contains(&EventName::LoadingBatch));
    }

    #[tokio::test]
    async fn finalize_on_empty_batch_emits_nothing() {
        let shared = JobShared::new(JobContext::new(None));
        let names = recorded_names(&shared);
        let dest = Arc::new(TestDestination::default());
        let mut engine = BatchEngine::new(0, dest.clone(), dest.config);

        engine.finalize(&shared).await;
        assert!(names.lock().unwrap().is_empty());
    }
}
