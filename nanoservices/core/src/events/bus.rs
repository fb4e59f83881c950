use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::Mutex;

use crate::events::event::{Event, EventName, EventPayload, JobContext};
use crate::events::listener::Listener;

/// Who registered a listener. Reporter listeners run before user listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerGroup {
    Reporter,
    User,
}

#[derive(Default)]
struct ListenerTable {
    named: HashMap<EventName, Vec<Listener>>,
    any: Vec<Listener>,
}

struct EmitState {
    next_id: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Ordered publish/subscribe registry for one job.
///
/// Per event, listeners run one at a time in this order: reporter listeners
/// for the name, user listeners for the name, reporter any-listeners, user
/// any-listeners. Emission is serialized, so delivery order equals event id
/// order even when destinations run concurrently.
pub struct EventBus {
    context: JobContext,
    reporters: RwLock<ListenerTable>,
    users: RwLock<ListenerTable>,
    emit_state: Mutex<EmitState>,
}

impl EventBus {
    pub fn new(context: JobContext) -> Self {
        Self {
            context,
            reporters: RwLock::new(ListenerTable::default()),
            users: RwLock::new(ListenerTable::default()),
            emit_state: Mutex::new(EmitState { next_id: 0, last_timestamp: None }),
        }
    }

    pub fn context(&self) -> &JobContext {
        &self.context
    }

    fn table(&self, group: ListenerGroup) -> &RwLock<ListenerTable> {
        match group {
            ListenerGroup::Reporter => &self.reporters,
            ListenerGroup::User => &self.users,
        }
    }

    /// Register a listener for one event name.
    pub fn on(&self, group: ListenerGroup, name: EventName, listener: Listener) {
        let mut table = self.table(group).write().unwrap_or_else(PoisonError::into_inner);
        table.named.entry(name).or_default().push(listener);
    }

    /// Register a listener for every event.
    pub fn on_any(&self, group: ListenerGroup, listener: Listener) {
        let mut table = self.table(group).write().unwrap_or_else(PoisonError::into_inner);
        table.any.push(listener);
    }

    /// Number of listeners that would receive an event with this name.
    pub fn listener_count(&self, name: EventName) -> usize {
        self.listeners_for(name).len()
    }

    fn listeners_for(&self, name: EventName) -> Vec<Listener> {
        let reporters = self.reporters.read().unwrap_or_else(PoisonError::into_inner);
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);

        let mut listeners = Vec::new();
        for table in [&*reporters, &*users] {
            if let Some(named) = table.named.get(&name) {
                listeners.extend(named.iter().cloned());
            }
        }
        listeners.extend(reporters.any.iter().cloned());
        listeners.extend(users.any.iter().cloned());
        listeners
    }

    /// Build the event and deliver it, returning once every listener has finished.
    pub async fn emit(&self, payload: EventPayload, job_stopped: bool) -> Arc<Event> {
        let mut state = self.emit_state.lock().await;

        let now = Utc::now();
        let timestamp = match state.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        state.last_timestamp = Some(timestamp);
        state.next_id += 1;

        let event = Arc::new(Event {
            event_id: state.next_id,
            job_id: self.context.job_id.clone(),
            job_name: self.context.job_name.clone(),
            timestamp,
            job_stopped,
            payload,
        });

        for listener in self.listeners_for(event.name()) {
            self.deliver(&listener, &event).await;
        }

        event
    }

    async fn deliver(&self, listener: &Listener, event: &Arc<Event>) {
        let call = std::panic::catch_unwind(AssertUnwindSafe(|| listener.call(event)));
        let outcome = match call {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
            Err(panic) => Err(panic),
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    job = %self.context.label(),
                    event = %event.name(),
                    error = %e,
                    "event listener failed"
                );
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!(
                    job = %self.context.label(),
                    event = %event.name(),
                    error = %message,
                    "event listener panicked"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::listener::ListenerResult;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn recorder(log: &Arc<StdMutex<Vec<String>>>, tag: &str) -> Listener {
        let log = log.clone();
        let tag = tag.to_string();
        Listener::payload(move |_| {
            let log = log.clone();
            let tag = tag.clone();
            async move {
                log.lock().unwrap().push(tag);
                Ok(())
            }
        })
    }

    async fn broken(_: EventPayload) -> ListenerResult {
        Err("listener broke".into())
    }

    async fn panicking(_: EventPayload) -> ListenerResult {
        panic!("listener panicked")
    }

    fn bus() -> EventBus {
        EventBus::new(JobContext::new(Some("test".into())))
    }

    #[tokio::test]
    async fn reporters_run_before_users_and_any_runs_last() {
        let bus = bus();
        let log = Arc::new(StdMutex::new(Vec::new()));

        bus.on_any(ListenerGroup::User, recorder(&log, "user-any"));
        bus.on(ListenerGroup::User, EventName::EndProcessingRow, recorder(&log, "user-1"));
        bus.on(ListenerGroup::Reporter, EventName::EndProcessingRow, recorder(&log, "reporter"));
        bus.on(ListenerGroup::User, EventName::EndProcessingRow, recorder(&log, "user-2"));
        bus.on_any(ListenerGroup::Reporter, recorder(&log, "reporter-any"));
        bus.on(ListenerGroup::User, EventName::EndProcessing, recorder(&log, "other"));

        bus.emit(EventPayload::EndProcessingRow, false).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["reporter", "user-1", "user-2", "reporter-any", "user-any"]
        );
    }

    #[tokio::test]
    async fn event_ids_increase_and_timestamps_never_go_back() {
        let bus = bus();
        let first = bus.emit(EventPayload::EndProcessingRow, false).await;
        let second = bus.emit(EventPayload::EndProcessing, true).await;

        assert_eq!(first.event_id, 1);
        assert_eq!(second.event_id, 2);
        assert!(second.timestamp >= first.timestamp);
        assert!(second.job_stopped);
        assert_eq!(second.job_name.as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn failing_listener_does_not_block_the_rest() {
        let bus = bus();
        let log = Arc::new(StdMutex::new(Vec::new()));

        bus.on(
            ListenerGroup::User,
            EventName::EndProcessingRow,
            Listener::payload(broken),
        );
        bus.on(
            ListenerGroup::User,
            EventName::EndProcessingRow,
            Listener::payload(panicking),
        );
        bus.on(ListenerGroup::User, EventName::EndProcessingRow, recorder(&log, "after"));

        bus.emit(EventPayload::EndProcessingRow, false).await;

        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[tokio::test]
    async fn extended_listener_sees_full_event() {
        let bus = bus();
        let seen = Arc::new(StdMutex::new(None));
        let sink = seen.clone();

        bus.on(
            ListenerGroup::User,
            EventName::StartProcessingRow,
            Listener::extended(move |event| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some((event.event_id, event.job_id.clone()));
                    Ok(())
                }
            }),
        );

        let emitted = bus
            .emit(EventPayload::StartProcessingRow { row: json!(1) }, false)
            .await;

        let (id, job_id) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(id, emitted.event_id);
        assert_eq!(job_id, bus.context().job_id);
        assert_eq!(bus.listener_count(EventName::StartProcessingRow), 1);
        assert_eq!(bus.listener_count(EventName::EndProcessing), 0);
    }
}
