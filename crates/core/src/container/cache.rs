use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::container::bindable::{BindableKind, Instance};
use crate::container::binding::{Binding, BindingError};
use crate::container::descriptor::{BindKey, Tag};
use crate::container::pending::Pending;
use crate::context::Context;
use crate::foundation::FreezeState;

/// Per-context store of bindings with parent elevation.
///
/// The map is only mutated during the single-threaded mutation phase, so
/// lookups after freeze need no locking. Lazy bindables guard their own
/// first computation.
pub struct BindingCache {
    context: String,
    bindings: HashMap<BindKey, Arc<Binding>>,
    parent: Option<Arc<Context>>,
    state: FreezeState,
    executor: Option<Handle>,
}

impl BindingCache {
    pub(crate) fn new(context: &str, parent: Option<Arc<Context>>, state: FreezeState) -> Self {
        Self {
            context: context.to_string(),
            bindings: HashMap::new(),
            parent,
            state,
            executor: None,
        }
    }

    pub(crate) fn set_executor(&mut self, executor: Handle) {
        self.executor = Some(executor);
    }

    /// Insert or replace a binding
    pub fn add_binding(&mut self, mut binding: Binding) -> Result<(), BindingError> {
        let key = binding.key().clone();

        if self.state.is_frozen() {
            return Err(BindingError::AlreadyFrozen {
                context: self.context.clone(),
                key: key.to_string(),
            });
        }

        if binding.bindable().is_none() {
            return Err(BindingError::IncompleteBinding {
                key: key.to_string(),
            });
        }

        match self.find(&key, true) {
            Some(existing) if !existing.is_overridable() => {
                return Err(BindingError::NonOverridableConflict {
                    key: key.to_string(),
                    owner: existing.context().to_string(),
                });
            }
            Some(existing) => {
                tracing::debug!(
                    context = %self.context,
                    key = %key,
                    previous_owner = %existing.context(),
                    kind = ?binding.kind(),
                    "Overriding binding"
                );
            }
            None => {
                tracing::debug!(context = %self.context, key = %key, kind = ?binding.kind(), "Adding binding");
            }
        }

        binding.set_context(&self.context);
        self.bindings.insert(key, Arc::new(binding));
        Ok(())
    }

    /// Look a binding up, optionally elevating to ancestors
    pub fn find(&self, key: &BindKey, elevate: bool) -> Option<Arc<Binding>> {
        if let Some(binding) = self.bindings.get(key) {
            return Some(binding.clone());
        }

        if elevate {
            self.parent
                .as_ref()
                .and_then(|parent| parent.bindings().find(key, true))
        } else {
            None
        }
    }

    pub fn exists(&self, key: &BindKey, elevate: bool) -> bool {
        self.find(key, elevate).is_some()
    }

    /// Typed form of [`exists`](Self::exists)
    pub fn contains<T: 'static, P: 'static>(&self, tag: impl Into<Tag>, elevate: bool) -> bool {
        self.exists(&BindKey::of::<T, P>(tag), elevate)
    }

    fn require(&self, key: &BindKey, elevate: bool) -> Result<Arc<Binding>, BindingError> {
        self.find(key, elevate)
            .ok_or_else(|| BindingError::UnresolvedBinding {
                key: key.to_string(),
                context: self.context.clone(),
                elevated: elevate,
            })
    }

    /// Resolve by key into an erased instance
    pub fn resolve_key(
        &self,
        key: &BindKey,
        param: &dyn Any,
        elevate: bool,
    ) -> Result<Instance, BindingError> {
        self.require(key, elevate)?.get(param)
    }

    /// Resolve a binding producing `T` from `param`
    pub fn resolve<T, P>(
        &self,
        tag: impl Into<Tag>,
        param: &P,
        elevate: bool,
    ) -> Result<Arc<T>, BindingError>
    where
        T: Send + Sync + 'static,
        P: 'static,
    {
        let key = BindKey::of::<T, P>(tag);
        self.require(&key, elevate)?.get_as::<T>(param)
    }

    /// Resolve an untagged, parameterless binding with elevation
    pub fn resolve_default<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, BindingError> {
        self.resolve::<T, ()>(Tag::Default, &(), true)
    }

    /// Resolve on the executor.
    ///
    /// Lookup happens on the calling thread; only the bindable's `get` is
    /// submitted, and only for threaded bindings.
    pub fn resolve_async<T, P>(&self, tag: impl Into<Tag>, param: P, elevate: bool) -> Pending<Arc<T>>
    where
        T: Send + Sync + 'static,
        P: Send + 'static,
    {
        let key = BindKey::of::<T, P>(tag);
        let binding = match self.require(&key, elevate) {
            Ok(binding) => binding,
            Err(e) => return Pending::ready(Err(e)),
        };

        if !binding.is_threaded() {
            return Pending::ready(binding.get_as::<T>(&param));
        }

        let executor = match self.executor.clone().or_else(|| Handle::try_current().ok()) {
            Some(executor) => executor,
            None => {
                return Pending::ready(Err(BindingError::Executor {
                    message: format!(
                        "no executor available in context '{}' for asynchronous resolution of {}",
                        self.context, key
                    ),
                }))
            }
        };

        Pending::spawned(executor.spawn_blocking(move || binding.get_as::<T>(&param)))
    }

    /// Create every `immediate` singleton owned by this cache
    pub(crate) fn instantiate_immediate(&self) -> Result<usize, BindingError> {
        let mut created = 0;
        for binding in self.bindings.values() {
            let eager = binding.is_immediate()
                && binding.kind() == Some(BindableKind::Singleton)
                && binding.key().param.is::<()>();
            if eager {
                binding.get(&())?;
                created += 1;
            }
        }
        Ok(created)
    }

    pub(crate) fn snapshot(&self) -> HashMap<BindKey, Arc<Binding>> {
        self.bindings.clone()
    }

    pub(crate) fn restore(&mut self, snapshot: HashMap<BindKey, Arc<Binding>>) {
        self.bindings = snapshot;
    }

    /// Keys of bindings owned by this context
    pub fn keys(&self) -> impl Iterator<Item = &BindKey> {
        self.bindings.keys()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

impl std::fmt::Debug for BindingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingCache")
            .field("context", &self.context)
            .field("bindings", &self.bindings.len())
            .field("has_parent", &self.parent.is_some())
            .field("state", &self.state.state())
            .finish()
    }
}
