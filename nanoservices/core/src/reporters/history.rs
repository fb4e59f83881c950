use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::engine::JobHandle;
use crate::events::event::{Event, EventPayload};
use crate::events::listener::ListenerResult;
use crate::store::db::Store;

use super::Reporter;

/// Writes an audit trail of job runs and batch load outcomes to SQLite.
///
/// The history is only ever appended to; nothing reads it back into a job.
#[derive(Clone)]
pub struct HistoryReporter {
    store: Arc<AsyncMutex<Store>>,
}

impl HistoryReporter {
    /// Open (or create) the history database. Runs a previous process left
    /// `running` are marked `abandoned`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let store = Store::open(path)?;
        let abandoned = store.mark_unfinished_as_abandoned()?;
        if abandoned > 0 {
            tracing::warn!(count = abandoned, "marked unfinished job runs from a previous session as abandoned");
        }
        Ok(Self::with_store(Arc::new(AsyncMutex::new(store))))
    }

    pub fn with_store(store: Arc<AsyncMutex<Store>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<AsyncMutex<Store>> {
        self.store.clone()
    }
}

#[derive(Default)]
struct Tally {
    destinations: Vec<String>,
    rows: i64,
    failures: i64,
    error: Option<String>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn record_count(data: &Value) -> i64 {
    match data {
        Value::Array(items) => items.len() as i64,
        _ => 1,
    }
}

async fn record(event: Arc<Event>, store: Arc<AsyncMutex<Store>>, tally: Arc<Mutex<Tally>>) -> ListenerResult {
    let at = event.timestamp.to_rfc3339();
    let run_id = event.job_id.as_str();

    // Update the tally first and decide what to write, without holding the
    // std mutex across the store lock.
    let write = {
        let mut tally = tally.lock().unwrap_or_else(PoisonError::into_inner);
        let destination = |index: &usize| {
            tally.destinations.get(*index).cloned().unwrap_or_else(|| index.to_string())
        };
        match &event.payload {
            EventPayload::StartProcessing { processor, destinations } => {
                tally.destinations = destinations.clone();
                tally.started_at = Some(event.timestamp);
                Some(Write::Start { processor: processor.clone() })
            }
            EventPayload::EndProcessingRow => {
                tally.rows += 1;
                None
            }
            EventPayload::LoadedBatch { destination: index, data } => Some(Write::Batch {
                destination: destination(index),
                status: "loaded",
                records: record_count(data),
                error: None,
            }),
            EventPayload::LoadingBatchError { destination: index, data, error } => {
                let write = Write::Batch {
                    destination: destination(index),
                    status: "load_failed",
                    records: record_count(data),
                    error: Some(error.clone()),
                };
                tally.failures += 1;
                Some(write)
            }
            EventPayload::TransformingBatchError { destination: index, rows, error } => {
                let write = Write::Batch {
                    destination: destination(index),
                    status: "transform_failed",
                    records: rows.len() as i64,
                    error: Some(error.clone()),
                };
                tally.failures += 1;
                Some(write)
            }
            EventPayload::RowGenerationError { .. } => {
                tally.failures += 1;
                None
            }
            EventPayload::ProcessingError { error } => {
                tally.error.get_or_insert_with(|| error.clone());
                None
            }
            EventPayload::EndProcessing => {
                let status = match (&tally.error, event.job_stopped) {
                    (Some(_), _) => "failed",
                    (None, true) => "stopped",
                    (None, false) => "completed",
                };
                let duration_ms = tally
                    .started_at
                    .map(|started| (event.timestamp - started).num_milliseconds())
                    .unwrap_or(0);
                Some(Write::Complete {
                    status,
                    duration_ms,
                    rows: tally.rows,
                    failures: tally.failures,
                    error: tally.error.clone(),
                })
            }
            _ => None,
        }
    };

    let Some(write) = write else { return Ok(()) };
    let store = store.lock().await;
    match write {
        Write::Start { processor } => {
            store.insert_job_run(run_id, event.job_name.as_deref(), &processor, &at)?;
        }
        Write::Batch { destination, status, records, error } => {
            store.insert_batch_load(run_id, &destination, status, records, error.as_deref(), &at)?;
        }
        Write::Complete { status, duration_ms, rows, failures, error } => {
            store.complete_job_run(run_id, status, &at, duration_ms, rows, failures, error.as_deref())?;
        }
    }
    Ok(())
}

enum Write {
    Start { processor: String },
    Batch { destination: String, status: &'static str, records: i64, error: Option<String> },
    Complete { status: &'static str, duration_ms: i64, rows: i64, failures: i64, error: Option<String> },
}

impl Reporter for HistoryReporter {
    fn name(&self) -> &str {
        "history"
    }

    fn attach(&self, job: &JobHandle) {
        let store = self.store.clone();
        let tally = Arc::new(Mutex::new(Tally::default()));
        job.on_any_extended(move |event| record(event, store.clone(), tally.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destinations::traits::{Destination, DestinationConfig};
    use crate::engine::{Job, JobOptions};
    use crate::processors::iter::IterProcessor;
    use async_trait::async_trait;
    use rowflow_utils::BoxError;
    use serde_json::json;

    struct FlakyDest;

    #[async_trait]
    impl Destination for FlakyDest {
        fn name(&self) -> &str { "flaky" }
        fn config(&self) -> DestinationConfig { DestinationConfig::batched(2) }
        async fn load_batch(&self, data: Value) -> Result<(), BoxError> {
            if data == json!([1, 2]) {
                return Err("503 service unavailable".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn records_run_and_batch_outcomes() {
        let store = Arc::new(AsyncMutex::new(Store::in_memory().unwrap()));
        let job = Job::new(
            IterProcessor::new((1..=5).map(|n| json!(n))).with_name("numbers"),
            vec![Arc::new(FlakyDest)],
            JobOptions {
                job_name: Some("audited".into()),
                reporters: vec![Box::new(HistoryReporter::with_store(store.clone()))],
                ..Default::default()
            },
        );
        let job_id = job.job_id().to_string();

        job.run().await.unwrap();

        let store = store.lock().await;
        let runs = store.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, job_id);
        assert_eq!(runs[0].job_name.as_deref(), Some("audited"));
        assert_eq!(runs[0].processor, "numbers");
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].rows, 5);
        assert_eq!(runs[0].failures, 1);

        let loads = store.batch_loads_for(&job_id).unwrap();
        let statuses: Vec<_> = loads.iter().map(|l| (l.status.as_str(), l.records)).collect();
        assert_eq!(statuses, vec![("load_failed", 2), ("loaded", 2), ("loaded", 1)]);
        assert_eq!(loads[0].destination, "flaky");
        assert_eq!(loads[0].error.as_deref(), Some("503 service unavailable"));
    }

    #[tokio::test]
    async fn stop_with_error_marks_run_failed() {
        let store = Arc::new(AsyncMutex::new(Store::in_memory().unwrap()));
        let job = Job::new(
            IterProcessor::new(vec![json!(3), json!(4)]),
            vec![Arc::new(FlakyDest)],
            JobOptions {
                reporters: vec![Box::new(HistoryReporter::with_store(store.clone()))],
                ..Default::default()
            },
        );
        job.stop_with_error("cancelled by operator");

        assert!(job.run().await.is_err());

        let runs = store.lock().await.recent_runs(1).unwrap();
        assert_eq!(runs[0].status, "failed");
        assert_eq!(runs[0].rows, 0);
        assert_eq!(runs[0].error.as_deref(), Some("cancelled by operator"));
    }
}
