use crate::engine::JobHandle;
use crate::events::event::{EventName, EventPayload};

use super::Reporter;

/// Writes every event to `tracing`: failures at `warn`, job start and end at
/// `info`, and row level traffic at `debug`.
#[derive(Debug, Default, Clone)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for LogReporter {
    fn name(&self) -> &str {
        "log"
    }

    fn attach(&self, job: &JobHandle) {
        job.on_any_extended(|event| async move {
            let job = event.job_name.as_deref().unwrap_or(&event.job_id);
            let name = event.name();

            if let Some(error) = event.payload.error() {
                tracing::warn!(
                    job = %job,
                    event_id = event.event_id,
                    event = %name,
                    destination = ?event.payload.destination(),
                    error = %error,
                    "job event"
                );
                return Ok(());
            }

            match (&event.payload, name) {
                (EventPayload::StartProcessing { processor, destinations }, _) => {
                    tracing::info!(job = %job, processor = %processor, destinations = ?destinations, "processing started");
                }
                (EventPayload::StartProcessingStream { stream_args }, _)
                | (EventPayload::EndProcessingStream { stream_args }, _) => {
                    tracing::info!(job = %job, event = %name, stream = ?stream_args, "job event");
                }
                (_, EventName::EndProcessing) => {
                    tracing::info!(job = %job, stopped = event.job_stopped, "processing ended");
                }
                _ => {
                    tracing::debug!(
                        job = %job,
                        event_id = event.event_id,
                        event = %name,
                        destination = ?event.payload.destination(),
                        "job event"
                    );
                }
            }
            Ok(())
        });
    }
}
