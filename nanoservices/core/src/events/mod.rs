pub mod bus;
pub mod event;
pub mod listener;

pub use bus::{EventBus, ListenerGroup};
pub use event::{Event, EventName, EventPayload, JobContext};
pub use listener::{Listener, ListenerResult};
