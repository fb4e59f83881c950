use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::engine::JobHandle;
use crate::events::event::EventPayload;
use crate::metrics;

use super::Reporter;

/// Records prometheus metrics for a job, labelled by job name (or id) and
/// destination name.
#[derive(Debug, Default, Clone)]
pub struct MetricsReporter;

impl MetricsReporter {
    pub fn new() -> Self {
        Self
    }
}

struct Labels {
    job: String,
    destinations: Vec<String>,
    started_at: Option<DateTime<Utc>>,
}

impl Labels {
    fn destination(&self, index: usize) -> &str {
        self.destinations.get(index).map(String::as_str).unwrap_or("unknown")
    }
}

impl Reporter for MetricsReporter {
    fn name(&self) -> &str {
        "metrics"
    }

    fn attach(&self, job: &JobHandle) {
        let labels = Arc::new(Mutex::new(Labels {
            job: job.context().label().to_string(),
            destinations: Vec::new(),
            started_at: None,
        }));

        job.on_any_extended(move |event| {
            let labels = labels.clone();
            async move {
                let mut labels = labels.lock().unwrap_or_else(PoisonError::into_inner);
                match &event.payload {
                    EventPayload::StartProcessing { destinations, .. } => {
                        labels.destinations = destinations.clone();
                        labels.started_at = Some(event.timestamp);
                    }
                    EventPayload::EndProcessingRow => metrics::inc_rows(&labels.job),
                    EventPayload::RowGenerated { destination, .. } => {
                        metrics::inc_records(&labels.job, labels.destination(*destination));
                    }
                    EventPayload::LoadedBatch { destination, .. } => {
                        metrics::inc_batches_loaded(&labels.job, labels.destination(*destination));
                    }
                    EventPayload::RowGenerationError { destination, .. } => {
                        metrics::inc_destination_failure(&labels.job, labels.destination(*destination), "generate");
                    }
                    EventPayload::TransformingBatchError { destination, .. } => {
                        metrics::inc_destination_failure(&labels.job, labels.destination(*destination), "transform");
                    }
                    EventPayload::LoadingBatchError { destination, .. } => {
                        metrics::inc_destination_failure(&labels.job, labels.destination(*destination), "load");
                    }
                    EventPayload::ProcessingError { .. } => metrics::inc_processing_error(&labels.job),
                    EventPayload::EndProcessing => {
                        if let Some(started) = labels.started_at.take() {
                            let elapsed = event.timestamp - started;
                            metrics::observe_duration(&labels.job, elapsed.num_milliseconds() as f64);
                        }
                    }
                    _ => {}
                }
                Ok(())
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destinations::traits::Destination;
    use crate::engine::{Job, JobOptions};
    use crate::processors::iter::IterProcessor;
    use async_trait::async_trait;
    use rowflow_utils::BoxError;
    use serde_json::{json, Value};

    struct Refusing;

    #[async_trait]
    impl Destination for Refusing {
        fn name(&self) -> &str { "refusing" }
        async fn load_batch(&self, _: Value) -> Result<(), BoxError> {
            Err("disk full".into())
        }
    }

    #[tokio::test]
    async fn job_traffic_is_counted_per_destination() {
        let job = Job::new(
            IterProcessor::new(vec![json!(1), json!(2)]),
            vec![Arc::new(Refusing)],
            JobOptions {
                job_name: Some("metrics_reporter_job".into()),
                reporters: vec![Box::new(MetricsReporter::new())],
                ..Default::default()
            },
        );

        job.run().await.unwrap();

        let text = metrics::gather_text();
        let rows_line = text
            .lines()
            .find(|l| l.starts_with("rowflow_rows_processed_total") && l.contains("metrics_reporter_job"))
            .unwrap();
        assert!(rows_line.ends_with(" 2"));
        assert!(text
            .lines()
            .any(|l| l.contains("destination=\"refusing\"") && l.contains("stage=\"load\"")));
        assert!(text.contains("rowflow_job_duration_ms"));
    }
}
