use futures_util::future::join_all;
use rowflow_utils::{Row, RowflowResult};
use serde::Deserialize;
use serde_json::Value;

use crate::destinations::batch::BatchEngine;
use crate::events::event::EventPayload;
use crate::job::state::{JobShared, JobState, RunState};
use crate::processors::traits::Processor;

/// How one row is handed to the destinations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOut {
    /// Destination 0 finishes the row before destination 1 starts.
    #[default]
    Sequential,
    /// All destinations work on the row together; the row still completes
    /// only when every destination is done.
    Concurrent,
}

/// Answer to a processor after it handed over a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

impl Flow {
    pub fn is_stop(&self) -> bool {
        *self == Flow::Stop
    }
}

/// The callback side of the processor contract.
///
/// A processor calls [`Pull::row`] once per row and awaits it before reading
/// the next one, and [`Pull::end_stream`] when one input stream is exhausted.
pub struct Pull<'a> {
    shared: &'a JobShared,
    engines: &'a mut [BatchEngine],
    fan_out: FanOut,
    run: &'a mut RunState,
}

impl<'a> Pull<'a> {
    pub(crate) fn new(
        shared: &'a JobShared,
        engines: &'a mut [BatchEngine],
        fan_out: FanOut,
        run: &'a mut RunState,
    ) -> Self {
        Self { shared, engines, fan_out, run }
    }

    /// Push one row through every destination.
    ///
    /// Rows offered after the row limit is reached or the job was stopped are
    /// ignored and answered with [`Flow::Stop`].
    pub async fn row(&mut self, row: Row, stream_args: &[Value]) -> Flow {
        if !self.run.accepting(self.shared) {
            return Flow::Stop;
        }

        if self.run.open_stream.is_none() {
            self.open_stream(stream_args).await;
        }

        self.shared
            .emit(EventPayload::StartProcessingRow { row: row.clone() })
            .await;

        let shared = self.shared;
        match self.fan_out {
            FanOut::Sequential => {
                for engine in self.engines.iter_mut() {
                    engine.accept_row(&row, shared).await;
                }
            }
            FanOut::Concurrent => {
                join_all(self.engines.iter_mut().map(|engine| engine.accept_row(&row, shared))).await;
            }
        }

        self.shared.emit(EventPayload::EndProcessingRow).await;

        if self.run.row_completed(self.shared) {
            tracing::debug!(job = %self.shared.context().label(), rows = self.run.rows, "row intake stopped");
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    /// Signal that the current stream is exhausted.
    ///
    /// A stream that produced no rows is still reported as started and ended,
    /// unless the job no longer accepts rows; such a stream is not reported.
    pub async fn end_stream(&mut self, stream_args: &[Value]) {
        if self.run.open_stream.is_none() {
            if self.is_stopped() {
                return;
            }
            self.open_stream(stream_args).await;
        }
        self.close_stream(stream_args.to_vec()).await;
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped() || self.run.limit_reached()
    }

    /// Resolves once the job is asked to stop. Push-based processors wait on
    /// this next to their input so an idle source still ends.
    pub async fn stopped(&self) {
        self.shared.stopped().await
    }

    pub fn rows_processed(&self) -> u64 {
        self.run.rows
    }

    async fn open_stream(&mut self, stream_args: &[Value]) {
        self.run.open_stream = Some(stream_args.to_vec());
        self.shared
            .emit(EventPayload::StartProcessingStream { stream_args: stream_args.to_vec() })
            .await;
    }

    async fn close_stream(&mut self, stream_args: Vec<Value>) {
        self.run.open_stream = None;
        self.run.streams += 1;
        self.shared
            .emit(EventPayload::EndProcessingStream { stream_args })
            .await;
    }

    /// Close a stream the processor left open when it returned.
    async fn close_dangling_stream(&mut self) {
        if let Some(stream_args) = self.run.open_stream.clone() {
            self.close_stream(stream_args).await;
        }
    }
}

/// Run the processor to completion against the destinations.
///
/// Returns the processor's own error, if any. Destination-scoped failures
/// never surface here; they are reported as events.
pub(crate) async fn drive(
    processor: &mut dyn Processor,
    shared: &JobShared,
    engines: &mut [BatchEngine],
    fan_out: FanOut,
    run: &mut RunState,
) -> RowflowResult<()> {
    run.transition(JobState::Running);

    let mut pull = Pull::new(shared, engines, fan_out, run);
    processor.process(&mut pull).await?;
    pull.close_dangling_stream().await;
    Ok(())
}

/// Flush every destination in order.
pub(crate) async fn finalize(shared: &JobShared, engines: &mut [BatchEngine], run: &mut RunState) {
    run.transition(JobState::Finalizing);
    for engine in engines.iter_mut() {
        engine.finalize(shared).await;
    }
}
