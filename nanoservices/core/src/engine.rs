use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use rowflow_utils::error::Error;
use rowflow_utils::RowflowResult;

use crate::destinations::batch::BatchEngine;
use crate::destinations::traits::{Destination, DestinationConfig};
use crate::events::bus::ListenerGroup;
use crate::events::event::{Event, EventName, EventPayload, JobContext};
use crate::events::listener::{Listener, ListenerResult};
use crate::job::runner::{self, FanOut};
use crate::job::state::{JobShared, JobState, RunState};
use crate::processors::traits::Processor;
use crate::reporters::Reporter;

/// Options for [`Job::new`].
#[derive(Default)]
pub struct JobOptions {
    /// Attached before any user listener, in this order.
    pub reporters: Vec<Box<dyn Reporter>>,
    pub job_name: Option<String>,
    /// Overrides the processor's own row limit when set.
    pub row_limit: Option<u64>,
    pub fan_out: FanOut,
}

/// Cloneable handle to a job: registers listeners and requests stops.
///
/// Handles given to reporters register into the reporter group, so their
/// listeners run before any listener registered through a user handle.
#[derive(Clone)]
pub struct JobHandle {
    shared: Arc<JobShared>,
    group: ListenerGroup,
}

impl JobHandle {
    fn new(shared: Arc<JobShared>, group: ListenerGroup) -> Self {
        Self { shared, group }
    }

    pub fn job_id(&self) -> &str {
        &self.shared.context().job_id
    }

    pub fn job_name(&self) -> Option<&str> {
        self.shared.context().job_name.as_deref()
    }

    pub fn context(&self) -> &JobContext {
        self.shared.context()
    }

    /// Listen for one event; the listener receives the event arguments.
    pub fn on<F, Fut>(&self, name: EventName, listener: F)
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        self.shared.bus.on(self.group, name, Listener::payload(listener));
    }

    /// Listen for one event; the listener receives the full event record.
    pub fn on_extended<F, Fut>(&self, name: EventName, listener: F)
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        self.shared.bus.on(self.group, name, Listener::extended(listener));
    }

    /// Listen for every event, after the name-specific listeners.
    pub fn on_any<F, Fut>(&self, listener: F)
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        self.shared.bus.on_any(self.group, Listener::payload(listener));
    }

    pub fn on_any_extended<F, Fut>(&self, listener: F)
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        self.shared.bus.on_any(self.group, Listener::extended(listener));
    }

    /// Stop pulling rows once the row in flight has been fully handled.
    pub fn stop(&self) {
        self.shared.stop(None);
    }

    /// Stop and make [`Job::run`] fail with `message`.
    pub fn stop_with_error(&self, message: impl Into<String>) {
        self.shared.stop(Some(message.into()));
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }
}

/// One processor fanned out to an ordered list of destinations.
pub struct Job {
    handle: JobHandle,
    processor: Box<dyn Processor>,
    engines: Vec<BatchEngine>,
    row_limit: Option<u64>,
    fan_out: FanOut,
}

impl Job {
    /// Build a job using each destination's own [`DestinationConfig`].
    pub fn new(
        processor: impl Processor + 'static,
        destinations: Vec<Arc<dyn Destination>>,
        options: JobOptions,
    ) -> Self {
        let destinations = destinations
            .into_iter()
            .map(|d| {
                let config = d.config();
                (d, config)
            })
            .collect();
        Self::from_parts(Box::new(processor), destinations, options)
    }

    pub(crate) fn from_parts(
        processor: Box<dyn Processor>,
        destinations: Vec<(Arc<dyn Destination>, DestinationConfig)>,
        options: JobOptions,
    ) -> Self {
        let shared = JobShared::new(JobContext::new(options.job_name));

        let reporter_handle = JobHandle::new(shared.clone(), ListenerGroup::Reporter);
        for reporter in &options.reporters {
            tracing::debug!(reporter = %reporter.name(), "attaching reporter");
            reporter.attach(&reporter_handle);
        }

        let engines = destinations
            .into_iter()
            .enumerate()
            .map(|(index, (destination, config))| BatchEngine::new(index, destination, config))
            .collect();

        let row_limit = options.row_limit.or_else(|| processor.row_limit());

        Self {
            handle: JobHandle::new(shared, ListenerGroup::User),
            processor,
            engines,
            row_limit,
            fan_out: options.fan_out,
        }
    }

    /// A handle for registering listeners or stopping the job from elsewhere.
    pub fn handle(&self) -> JobHandle {
        self.handle.clone()
    }

    pub fn job_id(&self) -> &str {
        self.handle.job_id()
    }

    pub fn on<F, Fut>(&self, name: EventName, listener: F)
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        self.handle.on(name, listener);
    }

    pub fn on_extended<F, Fut>(&self, name: EventName, listener: F)
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        self.handle.on_extended(name, listener);
    }

    pub fn on_any<F, Fut>(&self, listener: F)
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        self.handle.on_any(listener);
    }

    pub fn on_any_extended<F, Fut>(&self, listener: F)
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        self.handle.on_any_extended(listener);
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn stop_with_error(&self, message: impl Into<String>) {
        self.handle.stop_with_error(message);
    }

    /// Run the job to completion.
    ///
    /// Succeeds even when individual batches failed. Fails when the processor
    /// fails or when the job was stopped with an error message; the stop
    /// message takes precedence.
    pub async fn run(mut self) -> RowflowResult<()> {
        let shared = self.handle.shared.clone();
        let label = shared.context().label().to_string();
        let started = Instant::now();
        let mut run = RunState::new(self.row_limit);

        tracing::info!(
            job = %label,
            processor = %self.processor.name(),
            destinations = self.engines.len(),
            "job starting"
        );

        shared
            .emit(EventPayload::StartProcessing {
                processor: self.processor.name().to_string(),
                destinations: self.engines.iter().map(|e| e.name().to_string()).collect(),
            })
            .await;

        let outcome = runner::drive(
            self.processor.as_mut(),
            &shared,
            &mut self.engines,
            self.fan_out,
            &mut run,
        )
        .await;

        let processor_error = match outcome {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(job = %label, error = %e, "processor failed");
                shared.emit(EventPayload::ProcessingError { error: e.to_string() }).await;
                Some(e)
            }
        };

        let early_stop = shared.stop_message();
        if let (None, Some(message)) = (&processor_error, &early_stop) {
            tracing::warn!(job = %label, reason = %message, "job stopped with error");
            shared
                .emit(EventPayload::ProcessingError { error: message.clone() })
                .await;
        }

        runner::finalize(&shared, &mut self.engines, &mut run).await;

        // A listener may stop the job with a message during the final flush.
        let stop_message = shared.stop_message();
        if early_stop.is_none() && processor_error.is_none() {
            if let Some(message) = &stop_message {
                tracing::warn!(job = %label, reason = %message, "job stopped with error during finalization");
                shared
                    .emit(EventPayload::ProcessingError { error: message.clone() })
                    .await;
            }
        }

        run.transition(JobState::Done);
        shared.emit(EventPayload::EndProcessing).await;

        tracing::info!(
            job = %label,
            rows = run.rows,
            streams = run.streams,
            duration_ms = started.elapsed().as_millis() as u64,
            "job finished"
        );

        match (shared.stop_message(), processor_error) {
            (Some(message), _) => Err(Error::Stopped(message)),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(()),
        }
    }
}
