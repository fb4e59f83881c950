//! Listener handles registered on the [`EventBus`](super::bus::EventBus).
//!
//! A listener is an async callback. Plain listeners receive the event's
//! arguments ([`EventPayload`]); extended listeners receive the whole
//! [`Event`] including its id, timestamp and job identity, which is what
//! generic reporters need.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use rowflow_utils::BoxError;

use super::event::{Event, EventPayload};

pub type ListenerResult = Result<(), BoxError>;

type PayloadFn = dyn Fn(EventPayload) -> BoxFuture<'static, ListenerResult> + Send + Sync;
type ExtendedFn = dyn Fn(Arc<Event>) -> BoxFuture<'static, ListenerResult> + Send + Sync;

#[derive(Clone)]
pub enum Listener {
    Payload(Arc<PayloadFn>),
    Extended(Arc<ExtendedFn>),
}

impl Listener {
    /// Wrap an async function of the event arguments.
    ///
    /// ```no_run
    /// use rowflow_core::events::listener::Listener;
    /// let l = Listener::payload(|payload| async move {
    ///     println!("{:?}", payload);
    ///     Ok(())
    /// });
    /// ```
    pub fn payload<F, Fut>(f: F) -> Self
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        Listener::Payload(Arc::new(move |payload| Box::pin(f(payload))))
    }

    /// Wrap an async function of the full event record.
    pub fn extended<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ListenerResult> + Send + 'static,
    {
        Listener::Extended(Arc::new(move |event| Box::pin(f(event))))
    }

    pub(crate) fn call(&self, event: &Arc<Event>) -> BoxFuture<'static, ListenerResult> {
        match self {
            Listener::Payload(f) => f(event.payload.clone()),
            Listener::Extended(f) => f(event.clone()),
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Listener::Payload(_) => f.write_str("Listener::Payload"),
            Listener::Extended(_) => f.write_str("Listener::Extended"),
        }
    }
}
