//! Listener capability contract.
//!
//! A listener declares its handlers explicitly, one typed handler per event
//! type. The handler signature `(listener, bus, event)` is checked by the
//! compiler, so registration only has to confirm each event type is known.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::container::TypeInfo;
use crate::errors::BoxError;
use crate::events::bus::EventBus;
use crate::events::event::Event;

pub(crate) type ErasedHandler =
    dyn Fn(&(dyn Any + Send + Sync), &EventBus, &mut dyn Any) -> Result<(), BoxError> + Send + Sync;

/// Identifies one `register_listener` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Object that reacts to events
pub trait Listener: Send + Sync + Sized + 'static {
    /// Declare the handlers this listener exposes
    fn handlers(&self, handlers: &mut Handlers<Self>);
}

pub(crate) struct HandlerSpec {
    pub(crate) event: TypeInfo,
    pub(crate) handler: Arc<ErasedHandler>,
}

/// Collects a listener's declared handlers
pub struct Handlers<L> {
    specs: Vec<HandlerSpec>,
    _listener: PhantomData<fn(&L)>,
}

impl<L: Listener> Handlers<L> {
    pub(crate) fn new() -> Self {
        Self {
            specs: Vec::new(),
            _listener: PhantomData,
        }
    }

    /// Declare a handler for events of type `E`
    pub fn on<E, F>(&mut self, handler: F) -> &mut Self
    where
        E: Event,
        F: Fn(&L, &EventBus, &mut E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let erased = move |listener: &(dyn Any + Send + Sync),
                           bus: &EventBus,
                           event: &mut dyn Any|
              -> Result<(), BoxError> {
            let listener = listener
                .downcast_ref::<L>()
                .ok_or_else(|| format!("listener is not a {}", std::any::type_name::<L>()))?;
            let event = event
                .downcast_mut::<E>()
                .ok_or_else(|| format!("event is not a {}", std::any::type_name::<E>()))?;
            handler(listener, bus, event)
        };

        self.specs.push(HandlerSpec {
            event: TypeInfo::of::<E>(),
            handler: Arc::new(erased),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub(crate) fn into_specs(self) -> Vec<HandlerSpec> {
        self.specs
    }
}
