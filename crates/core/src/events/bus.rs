use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::RwLock;
use thiserror::Error;

use crate::container::TypeInfo;
use crate::context::Context;
use crate::events::event::{
    Event, EventBinding, EventType, ListenerRegistrationEvent, ModulesInitMid, ModulesInitPost,
    ModulesInitPre, Veto,
};
use crate::events::listener::{Handlers, Listener, ListenerId};
use crate::foundation::FreezeState;

/// A single listener invocation that did not complete
#[derive(Debug, Clone)]
pub struct ListenerFailure {
    pub event: &'static str,
    pub listener: &'static str,
    pub context: String,
    pub message: String,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} handling {} in '{}': {}",
            self.listener, self.event, self.context, self.message
        )
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Context '{context}' is frozen; listeners and event types can no longer be registered")]
    AlreadyFrozen { context: String },

    #[error("Listener {listener} is not usable: {reason}")]
    InvalidListenerSignature {
        listener: &'static str,
        reason: String,
    },

    #[error("Event type {event} is not registered in context '{context}'")]
    UnknownEventType { event: String, context: String },

    #[error("{} listener(s) failed while handling {event}: {}", .failures.len(), join_failures(.failures))]
    ListenerFailures {
        event: &'static str,
        failures: Vec<ListenerFailure>,
    },
}

fn join_failures(failures: &[ListenerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EventError {
    pub fn failures(&self) -> &[ListenerFailure] {
        match self {
            EventError::ListenerFailures { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Per-context event dispatcher.
///
/// Event types and listeners are registered during the mutation phase.
/// Firing is allowed at any time and escalates to the parent context before
/// local listeners run.
pub struct EventBus {
    context: String,
    types: RwLock<HashMap<TypeId, Arc<EventType>>>,
    parent: Option<Arc<Context>>,
    state: FreezeState,
    next_listener: AtomicU64,
}

impl EventBus {
    pub(crate) fn new(context: &str, parent: Option<Arc<Context>>, state: FreezeState) -> Self {
        let types = match &parent {
            Some(parent) => parent
                .events()
                .types
                .read()
                .iter()
                .map(|(id, ty)| (*id, Arc::new(ty.inherit())))
                .collect(),
            None => HashMap::new(),
        };

        let bus = Self {
            context: context.to_string(),
            types: RwLock::new(types),
            parent,
            state,
            next_listener: AtomicU64::new(1),
        };

        if bus.parent.is_none() {
            bus.insert_type::<ListenerRegistrationEvent>("listener-registration", None);
            bus.insert_type::<ModulesInitPre>("modules-init-pre", None);
            bus.insert_type::<ModulesInitMid>("modules-init-mid", None);
            bus.insert_type::<ModulesInitPost>("modules-init-post", None);
        }

        bus
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    fn check_mutable(&self) -> Result<(), EventError> {
        if self.state.is_frozen() {
            return Err(EventError::AlreadyFrozen {
                context: self.context.clone(),
            });
        }
        Ok(())
    }

    fn insert_type<E: Event>(&self, name: &str, veto: Option<Veto>) -> bool {
        let mut types = self.types.write();
        if types.contains_key(&TypeId::of::<E>()) {
            return false;
        }
        types.insert(
            TypeId::of::<E>(),
            Arc::new(EventType::new(name.to_string(), TypeInfo::of::<E>(), veto)),
        );
        true
    }

    /// Register a new event type. Returns `false` if `E` is already known here.
    pub fn register_event<E: Event>(&self, name: &str) -> Result<bool, EventError> {
        self.check_mutable()?;
        let added = self.insert_type::<E>(name, None);
        if added {
            tracing::debug!(context = %self.context, event = name, "Registered event type");
        }
        Ok(added)
    }

    /// Register a new event type whose instances must pass `veto` to be delivered
    pub fn register_event_with_veto<E, F>(&self, name: &str, veto: F) -> Result<bool, EventError>
    where
        E: Event,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.check_mutable()?;
        let veto: Veto = Arc::new(move |event: &dyn Any| {
            event.downcast_ref::<E>().map_or(false, |event| veto(event))
        });
        let added = self.insert_type::<E>(name, Some(veto));
        if added {
            tracing::debug!(context = %self.context, event = name, "Registered vetoable event type");
        }
        Ok(added)
    }

    pub fn has_event<E: Event>(&self) -> bool {
        self.types.read().contains_key(&TypeId::of::<E>())
    }

    pub fn event_type<E: Event>(&self) -> Option<Arc<EventType>> {
        self.types.read().get(&TypeId::of::<E>()).cloned()
    }

    /// Names of every event type known to this bus, sorted
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .types
            .read()
            .values()
            .map(|ty| ty.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Attach every handler `listener` declares.
    ///
    /// The bus keeps only a weak reference; the listener stops receiving
    /// events once the caller drops its last `Arc`. With `thread` set,
    /// deliveries from any other thread are recorded as failures.
    pub fn register_listener<L: Listener>(
        &self,
        listener: &Arc<L>,
        thread: Option<ThreadId>,
    ) -> Result<ListenerId, EventError> {
        self.check_mutable()?;

        let listener_name = std::any::type_name::<L>();
        let mut handlers = Handlers::<L>::new();
        listener.handlers(&mut handlers);

        self.fire_event(
            ListenerRegistrationEvent {
                context: self.context.clone(),
                listener: listener_name,
                handlers: handlers.len(),
            },
            &self.context,
            true,
        )?;

        if handlers.is_empty() {
            return Err(EventError::InvalidListenerSignature {
                listener: listener_name,
                reason: "declares no event handlers".to_string(),
            });
        }

        let specs = handlers.into_specs();
        let targets = {
            let types = self.types.read();
            let mut targets = Vec::with_capacity(specs.len());
            for spec in &specs {
                match types.get(&spec.event.id) {
                    Some(ty) => targets.push(Arc::clone(ty)),
                    None => {
                        return Err(EventError::UnknownEventType {
                            event: spec.event.name.to_string(),
                            context: self.context.clone(),
                        })
                    }
                }
            }
            targets
        };

        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let erased: Arc<dyn Any + Send + Sync> = listener.clone();
        let weak = Arc::downgrade(&erased);

        for (spec, ty) in specs.into_iter().zip(targets) {
            tracing::debug!(
                context = %self.context,
                listener = listener_name,
                event = ty.name(),
                "Attached listener"
            );
            ty.add(EventBinding {
                id,
                listener_name,
                listener: weak.clone(),
                handler: spec.handler,
                thread,
            });
        }

        Ok(id)
    }

    /// Detach every handler registered under `id`. Allowed after freeze.
    pub fn unregister_listener(&self, id: ListenerId) -> usize {
        let removed: usize = self.types.read().values().map(|ty| ty.remove(id)).sum();
        if removed > 0 {
            tracing::debug!(context = %self.context, listener = %id, removed, "Detached listener");
        }
        removed
    }

    /// Deliver `event` to the ancestors' listeners (when `escalate`) and then
    /// to this context's listeners.
    ///
    /// Every listener gets its turn; failures are collected and reported once
    /// all of them have run. A vetoed event is returned unchanged.
    pub fn fire_event<E: Event>(
        &self,
        event: E,
        source: &str,
        escalate: bool,
    ) -> Result<E, EventError> {
        if !self.has_event::<E>() {
            return Err(EventError::UnknownEventType {
                event: std::any::type_name::<E>().to_string(),
                context: self.context.clone(),
            });
        }

        let mut event = event;
        let mut failures = Vec::new();
        self.dispatch(&mut event, source, escalate, &mut failures);

        if failures.is_empty() {
            Ok(event)
        } else {
            tracing::warn!(
                context = %self.context,
                event = std::any::type_name::<E>(),
                failed = failures.len(),
                "Listeners failed"
            );
            Err(EventError::ListenerFailures {
                event: std::any::type_name::<E>(),
                failures,
            })
        }
    }

    fn dispatch<E: Event>(
        &self,
        event: &mut E,
        source: &str,
        escalate: bool,
        failures: &mut Vec<ListenerFailure>,
    ) {
        let Some(ty) = self.event_type::<E>() else {
            return;
        };

        if escalate {
            if let Some(parent) = &self.parent {
                parent.events().dispatch(event, source, true, failures);
            }
        }

        if !ty.admits(&*event) {
            tracing::trace!(context = %self.context, event = ty.name(), source, "Event vetoed");
            return;
        }

        let current = thread::current().id();
        let mut stale = false;

        for binding in ty.snapshot() {
            let Some(listener) = binding.listener.upgrade() else {
                stale = true;
                continue;
            };

            if let Some(required) = binding.thread {
                if required != current {
                    failures.push(ListenerFailure {
                        event: std::any::type_name::<E>(),
                        listener: binding.listener_name,
                        context: self.context.clone(),
                        message: format!(
                            "must run on thread {required:?} but event was fired on {current:?}"
                        ),
                    });
                    continue;
                }
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                (binding.handler)(&*listener, self, &mut *event as &mut dyn Any)
            }));

            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            failures.push(ListenerFailure {
                event: std::any::type_name::<E>(),
                listener: binding.listener_name,
                context: self.context.clone(),
                message,
            });
        }

        if stale {
            let pruned = ty.prune();
            tracing::trace!(context = %self.context, event = ty.name(), pruned, "Pruned dropped listeners");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("context", &self.context)
            .field("events", &self.event_names())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
