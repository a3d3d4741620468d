pub mod bus;
pub mod event;
pub mod listener;

pub use bus::{EventBus, EventError, ListenerFailure};
pub use event::{
    Event, EventType, ListenerRegistrationEvent, ModulesInitMid, ModulesInitPost, ModulesInitPre,
};
pub use listener::{Handlers, Listener, ListenerId};
