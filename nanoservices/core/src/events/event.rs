use std::fmt;

use chrono::{DateTime, Utc};
use rowflow_utils::{Record, Row};
use serde::Serialize;
use serde_json::Value;

/// Name of a lifecycle event, used as the key when registering listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    StartProcessing,
    StartProcessingStream,
    StartProcessingRow,
    RowGenerated,
    RowGenerationError,
    EndProcessingRow,
    TransformingBatch,
    TransformedBatch,
    TransformingBatchError,
    EndTransformingBatch,
    LoadingBatch,
    LoadedBatch,
    LoadingBatchError,
    EndLoadingBatch,
    EndProcessingStream,
    ProcessingError,
    EndProcessing,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::StartProcessing => "startProcessing",
            EventName::StartProcessingStream => "startProcessingStream",
            EventName::StartProcessingRow => "startProcessingRow",
            EventName::RowGenerated => "rowGenerated",
            EventName::RowGenerationError => "rowGenerationError",
            EventName::EndProcessingRow => "endProcessingRow",
            EventName::TransformingBatch => "transformingBatch",
            EventName::TransformedBatch => "transformedBatch",
            EventName::TransformingBatchError => "transformingBatchError",
            EventName::EndTransformingBatch => "endTransformingBatch",
            EventName::LoadingBatch => "loadingBatch",
            EventName::LoadedBatch => "loadedBatch",
            EventName::LoadingBatchError => "loadingBatchError",
            EventName::EndLoadingBatch => "endLoadingBatch",
            EventName::EndProcessingStream => "endProcessingStream",
            EventName::ProcessingError => "processingError",
            EventName::EndProcessing => "endProcessing",
        }
    }

    /// True for the events that report a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            EventName::RowGenerationError
                | EventName::TransformingBatchError
                | EventName::LoadingBatchError
                | EventName::ProcessingError
        )
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The arguments carried by an event. `destination` is the index of the
/// destination in the order it was given to the job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "eventName", content = "eventArguments", rename_all = "camelCase")]
pub enum EventPayload {
    StartProcessing { processor: String, destinations: Vec<String> },
    StartProcessingStream { stream_args: Vec<Value> },
    StartProcessingRow { row: Row },
    RowGenerated { destination: usize, record: Record },
    RowGenerationError { destination: usize, row: Row, error: String },
    EndProcessingRow,
    TransformingBatch { destination: usize, rows: Vec<Record> },
    /// `data` is `None` when the transformer dropped the batch.
    TransformedBatch { destination: usize, data: Option<Value> },
    TransformingBatchError { destination: usize, rows: Vec<Record>, error: String },
    EndTransformingBatch { destination: usize },
    LoadingBatch { destination: usize, data: Value },
    LoadedBatch { destination: usize, data: Value },
    LoadingBatchError { destination: usize, data: Value, error: String },
    EndLoadingBatch { destination: usize },
    EndProcessingStream { stream_args: Vec<Value> },
    ProcessingError { error: String },
    EndProcessing,
}

impl EventPayload {
    pub fn name(&self) -> EventName {
        match self {
            EventPayload::StartProcessing { .. } => EventName::StartProcessing,
            EventPayload::StartProcessingStream { .. } => EventName::StartProcessingStream,
            EventPayload::StartProcessingRow { .. } => EventName::StartProcessingRow,
            EventPayload::RowGenerated { .. } => EventName::RowGenerated,
            EventPayload::RowGenerationError { .. } => EventName::RowGenerationError,
            EventPayload::EndProcessingRow => EventName::EndProcessingRow,
            EventPayload::TransformingBatch { .. } => EventName::TransformingBatch,
            EventPayload::TransformedBatch { .. } => EventName::TransformedBatch,
            EventPayload::TransformingBatchError { .. } => EventName::TransformingBatchError,
            EventPayload::EndTransformingBatch { .. } => EventName::EndTransformingBatch,
            EventPayload::LoadingBatch { .. } => EventName::LoadingBatch,
            EventPayload::LoadedBatch { .. } => EventName::LoadedBatch,
            EventPayload::LoadingBatchError { .. } => EventName::LoadingBatchError,
            EventPayload::EndLoadingBatch { .. } => EventName::EndLoadingBatch,
            EventPayload::EndProcessingStream { .. } => EventName::EndProcessingStream,
            EventPayload::ProcessingError { .. } => EventName::ProcessingError,
            EventPayload::EndProcessing => EventName::EndProcessing,
        }
    }

    /// Destination index for destination-scoped events.
    pub fn destination(&self) -> Option<usize> {
        match self {
            EventPayload::RowGenerated { destination, .. }
            | EventPayload::RowGenerationError { destination, .. }
            | EventPayload::TransformingBatch { destination, .. }
            | EventPayload::TransformedBatch { destination, .. }
            | EventPayload::TransformingBatchError { destination, .. }
            | EventPayload::EndTransformingBatch { destination }
            | EventPayload::LoadingBatch { destination, .. }
            | EventPayload::LoadedBatch { destination, .. }
            | EventPayload::LoadingBatchError { destination, .. }
            | EventPayload::EndLoadingBatch { destination } => Some(*destination),
            _ => None,
        }
    }

    /// Error message for failure events.
    pub fn error(&self) -> Option<&str> {
        match self {
            EventPayload::RowGenerationError { error, .. }
            | EventPayload::TransformingBatchError { error, .. }
            | EventPayload::LoadingBatchError { error, .. }
            | EventPayload::ProcessingError { error } => Some(error),
            _ => None,
        }
    }
}

/// Identity of the job that emits events. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub job_id: String,
    pub job_name: Option<String>,
}

impl JobContext {
    pub fn new(job_name: Option<String>) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            job_name,
        }
    }

    /// Label used in logs and metrics: the job name, or the id when unnamed.
    pub fn label(&self) -> &str {
        self.job_name.as_deref().unwrap_or(&self.job_id)
    }
}

/// An emitted event as seen by extended listeners.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: u64,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub job_stopped: bool,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn name(&self) -> EventName {
        self.payload.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_reports_name_and_destination() {
        let payload = EventPayload::LoadingBatchError {
            destination: 2,
            data: json!([1, 2]),
            error: "boom".to_string(),
        };
        assert_eq!(payload.name(), EventName::LoadingBatchError);
        assert_eq!(payload.destination(), Some(2));
        assert_eq!(payload.error(), Some("boom"));
        assert!(payload.name().is_error());

        assert_eq!(EventPayload::EndProcessingRow.destination(), None);
        assert!(!EventName::LoadedBatch.is_error());
    }

    #[test]
    fn event_serializes_with_camel_case_name() {
        let event = Event {
            event_id: 7,
            job_id: "job-1".to_string(),
            job_name: Some("nightly".to_string()),
            timestamp: Utc::now(),
            job_stopped: false,
            payload: EventPayload::StartProcessingRow { row: json!({"id": 1}) },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventName"], "startProcessingRow");
        assert_eq!(value["eventArguments"]["row"]["id"], 1);
        assert_eq!(value["eventId"], 7);
        assert_eq!(value["jobName"], "nightly");
        assert_eq!(EventName::StartProcessingRow.to_string(), "startProcessingRow");
    }

    #[test]
    fn unnamed_job_is_labelled_by_id() {
        let ctx = JobContext::new(None);
        assert_eq!(ctx.label(), ctx.job_id);
        let named = JobContext::new(Some("orders".into()));
        assert_eq!(named.label(), "orders");
        assert_ne!(ctx.job_id, named.job_id);
    }
}
