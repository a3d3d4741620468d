use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use parking_lot::RwLock;

use crate::container::TypeInfo;
use crate::events::listener::{ErasedHandler, ListenerId};

/// Marker for types that can be fired on an [`EventBus`](crate::events::EventBus)
pub trait Event: Send + Sync + 'static {}

pub(crate) type Veto = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// A listener's handler for one event type, recorded at registration
#[derive(Clone)]
pub(crate) struct EventBinding {
    pub(crate) id: ListenerId,
    pub(crate) listener_name: &'static str,
    pub(crate) listener: Weak<dyn Any + Send + Sync>,
    pub(crate) handler: Arc<ErasedHandler>,
    pub(crate) thread: Option<ThreadId>,
}

/// Registered event type with its veto predicate and listener table
pub struct EventType {
    name: String,
    event: TypeInfo,
    veto: Option<Veto>,
    listeners: RwLock<Vec<EventBinding>>,
}

impl EventType {
    pub(crate) fn new(name: String, event: TypeInfo, veto: Option<Veto>) -> Self {
        Self {
            name,
            event,
            veto,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Same name, identity and veto, with a listener table of its own
    pub(crate) fn inherit(&self) -> Self {
        Self::new(self.name.clone(), self.event, self.veto.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event(&self) -> TypeInfo {
        self.event
    }

    pub fn has_veto(&self) -> bool {
        self.veto.is_some()
    }

    /// Number of live listener entries
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|binding| binding.listener.strong_count() > 0)
            .count()
    }

    pub(crate) fn admits(&self, event: &dyn Any) -> bool {
        self.veto.as_ref().map_or(true, |veto| veto(event))
    }

    pub(crate) fn add(&self, binding: EventBinding) {
        self.listeners.write().push(binding);
    }

    pub(crate) fn snapshot(&self) -> Vec<EventBinding> {
        self.listeners.read().clone()
    }

    pub(crate) fn remove(&self, id: ListenerId) -> usize {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|binding| binding.id != id);
        before - listeners.len()
    }

    /// Drop entries whose listener is gone
    pub(crate) fn prune(&self) -> usize {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|binding| binding.listener.strong_count() > 0);
        before - listeners.len()
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventType")
            .field("name", &self.name)
            .field("event", &self.event.name)
            .field("veto", &self.veto.is_some())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Fired before a listener's handlers are discovered and attached
#[derive(Debug, Clone)]
pub struct ListenerRegistrationEvent {
    pub context: String,
    pub listener: &'static str,
    pub handlers: usize,
}

impl Event for ListenerRegistrationEvent {}

/// Fired once module order is settled, before any module data is built
#[derive(Debug, Clone)]
pub struct ModulesInitPre {
    pub context: String,
    pub modules: Vec<String>,
}

impl Event for ModulesInitPre {}

/// Fired after every module's data and bindings are in place
#[derive(Debug, Clone)]
pub struct ModulesInitMid {
    pub context: String,
    pub modules: Vec<String>,
}

impl Event for ModulesInitMid {}

/// Fired after every entry point's post-initialization hook
#[derive(Debug, Clone)]
pub struct ModulesInitPost {
    pub context: String,
    pub modules: Vec<String>,
}

impl Event for ModulesInitPost {}
