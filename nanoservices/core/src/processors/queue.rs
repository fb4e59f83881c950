//! Push-based input drained one row at a time.
//!
//! Transports that deliver data on their own schedule (subscriptions,
//! callbacks) push rows into a [`QueueSender`]. The [`QueueProcessor`] drains
//! the queue into the job one row at a time, so the single-row-in-flight
//! contract holds even though the producer never waits. The stream ends when
//! every sender has been dropped, or as soon as the job is asked to stop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rowflow_utils::error::Error;
use rowflow_utils::{Row, RowflowResult};
use serde_json::Value;
use tokio::sync::mpsc;

use super::traits::{Processor, Pull};

#[derive(Debug, Clone)]
pub struct QueueSender {
    sender: mpsc::UnboundedSender<Row>,
    depth: Arc<AtomicUsize>,
}

impl QueueSender {
    /// Queue a row. Fails once the processor has stopped draining.
    pub fn send(&self, row: Row) -> RowflowResult<()> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.sender.send(row).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            Error::processor("queue processor is no longer accepting rows")
        })
    }

    /// Rows queued but not yet handed to the job.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

pub struct QueueProcessor {
    name: String,
    receiver: mpsc::UnboundedReceiver<Row>,
    depth: Arc<AtomicUsize>,
    stream_args: Vec<Value>,
    row_limit: Option<u64>,
}

impl QueueProcessor {
    pub fn new(name: impl Into<String>) -> (Self, QueueSender) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let processor = Self {
            name: name.into(),
            receiver,
            depth: depth.clone(),
            stream_args: Vec::new(),
            row_limit: None,
        };
        (processor, QueueSender { sender, depth })
    }

    pub fn with_stream_args(mut self, args: Vec<Value>) -> Self {
        self.stream_args = args;
        self
    }

    pub fn with_row_limit(mut self, limit: u64) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for QueueProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_limit(&self) -> Option<u64> {
        self.row_limit
    }

    async fn process(&mut self, pull: &mut Pull<'_>) -> RowflowResult<()> {
        loop {
            let next = tokio::select! {
                biased;
                _ = pull.stopped() => None,
                row = self.receiver.recv() => row,
            };
            let Some(row) = next else { break };

            let depth = self.depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            tracing::trace!(processor = %self.name, depth, "draining queued row");
            if pull.row(row, &self.stream_args).await.is_stop() {
                break;
            }
        }

        // Refuse anything pushed after we stop draining, and drop what is left.
        self.receiver.close();
        let mut discarded = 0usize;
        while self.receiver.try_recv().is_ok() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(processor = %self.name, discarded, "discarded queued rows after stop");
        }

        pull.end_stream(&self.stream_args).await;
        Ok(())
    }
}
