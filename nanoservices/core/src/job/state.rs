use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::watch;

use crate::events::bus::EventBus;
use crate::events::event::{Event, EventPayload, JobContext};

/// Lifecycle of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Stopping,
    Finalizing,
    Done,
}

/// State shared between the orchestrator, its handles, and listeners.
pub struct JobShared {
    pub bus: EventBus,
    stopped: AtomicBool,
    stop_signal: watch::Sender<bool>,
    stop_message: Mutex<Option<String>>,
}

impl JobShared {
    pub fn new(context: JobContext) -> Arc<Self> {
        Arc::new(Self {
            bus: EventBus::new(context),
            stopped: AtomicBool::new(false),
            stop_signal: watch::Sender::new(false),
            stop_message: Mutex::new(None),
        })
    }

    pub fn context(&self) -> &JobContext {
        self.bus.context()
    }

    /// Request a stop. A later message replaces an earlier one; a stop
    /// without a message keeps any message already recorded.
    pub fn stop(&self, message: Option<String>) {
        if let Some(message) = message {
            *self.stop_message.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
        }
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_signal.send_replace(true);
    }

    /// Resolves once a stop has been requested, immediately if it already was.
    pub async fn stopped(&self) {
        let mut signal = self.stop_signal.subscribe();
        // The sender lives as long as `self`, so this only returns on a stop.
        let _ = signal.wait_for(|stopped| *stopped).await;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop_message(&self) -> Option<String> {
        self.stop_message.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub async fn emit(&self, payload: EventPayload) -> Arc<Event> {
        self.bus.emit(payload, self.is_stopped()).await
    }
}

/// Per-run bookkeeping owned by the orchestrator loop.
#[derive(Debug)]
pub struct RunState {
    pub state: JobState,
    pub rows: u64,
    pub streams: u64,
    /// Arguments of the stream currently being read, if one is open.
    pub open_stream: Option<Vec<Value>>,
    row_limit: Option<u64>,
}

impl RunState {
    /// `row_limit` of `None` or `Some(0)` means unlimited.
    pub fn new(row_limit: Option<u64>) -> Self {
        Self {
            state: JobState::Idle,
            rows: 0,
            streams: 0,
            open_stream: None,
            row_limit: row_limit.filter(|limit| *limit > 0),
        }
    }

    pub fn row_limit(&self) -> Option<u64> {
        self.row_limit
    }

    pub fn limit_reached(&self) -> bool {
        matches!(self.row_limit, Some(limit) if self.rows >= limit)
    }

    /// Whether another row may enter the fan-out.
    pub fn accepting(&self, shared: &JobShared) -> bool {
        self.state == JobState::Running && !shared.is_stopped() && !self.limit_reached()
    }

    /// Record a finished row. Returns true when the job should stop pulling.
    pub fn row_completed(&mut self, shared: &JobShared) -> bool {
        self.rows += 1;
        if self.limit_reached() || shared.is_stopped() {
            self.state = JobState::Stopping;
            true
        } else {
            false
        }
    }

    pub fn transition(&mut self, next: JobState) {
        tracing::trace!(from = ?self.state, to = ?next, "job state transition");
        self.state = next;
    }
}
