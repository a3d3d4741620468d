use std::any::Any;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use crate::container::bindable::{Bindable, BindableKind, Instance};
use crate::container::descriptor::{BindKey, Tag};

/// Binding registration and resolution errors
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("Cannot add binding {key} to context '{context}': context is frozen")]
    AlreadyFrozen { context: String, key: String },

    #[error("Binding {key} has no bindable attached")]
    IncompleteBinding { key: String },

    #[error("Binding {key} already exists in context '{owner}' and is not overridable")]
    NonOverridableConflict { key: String, owner: String },

    #[error("No binding for {key} in context '{context}' (elevate: {elevated})")]
    UnresolvedBinding {
        key: String,
        context: String,
        elevated: bool,
    },

    #[error("Type mismatch in {context}: expected {expected}")]
    TypeMismatch { expected: String, context: String },

    #[error("Executor error: {message}")]
    Executor { message: String },
}

impl BindingError {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::UnresolvedBinding { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::NonOverridableConflict { .. })
    }
}

/// Immutable registration connecting a key to a bindable
#[derive(Debug, Clone)]
pub struct Binding {
    key: BindKey,
    overridable: bool,
    immediate: bool,
    threaded: bool,
    bindable: Option<Bindable>,
    context: String,
}

impl Binding {
    /// Start a binding producing `T` from parameter `P`
    pub fn builder<T, P>() -> BindingBuilder<T, P>
    where
        T: Send + Sync + 'static,
        P: 'static,
    {
        BindingBuilder::new()
    }

    /// Binding over an already erased bindable; types are taken from `key`
    pub fn erased(key: BindKey, bindable: Option<Bindable>) -> Self {
        Self {
            key,
            overridable: false,
            immediate: false,
            threaded: true,
            bindable,
            context: String::new(),
        }
    }

    pub fn with_flags(mut self, overridable: bool, immediate: bool, threaded: bool) -> Self {
        self.overridable = overridable;
        self.immediate = immediate;
        self.threaded = threaded;
        self
    }

    pub fn key(&self) -> &BindKey {
        &self.key
    }

    pub fn tag(&self) -> &Tag {
        &self.key.tag
    }

    pub fn is_overridable(&self) -> bool {
        self.overridable
    }

    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    pub fn bindable(&self) -> Option<&Bindable> {
        self.bindable.as_ref()
    }

    pub fn kind(&self) -> Option<BindableKind> {
        self.bindable.as_ref().map(Bindable::kind)
    }

    /// Name of the context owning this binding
    pub fn context(&self) -> &str {
        &self.context
    }

    pub(crate) fn set_context(&mut self, context: &str) {
        self.context = context.to_string();
    }

    /// Produce an instance for `param`
    pub fn get(&self, param: &dyn Any) -> Result<Instance, BindingError> {
        let bindable = self.bindable.as_ref().ok_or_else(|| BindingError::IncompleteBinding {
            key: self.key.to_string(),
        })?;
        bindable.get(self, param)
    }

    /// Produce an instance and downcast it to `T`
    pub fn get_as<T: Send + Sync + 'static>(&self, param: &dyn Any) -> Result<Arc<T>, BindingError> {
        self.get(param)?
            .downcast::<T>()
            .map_err(|_| BindingError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                context: format!("binding {}", self.key),
            })
    }
}

/// Typed builder for [`Binding`]
pub struct BindingBuilder<T, P> {
    tag: Tag,
    overridable: bool,
    immediate: bool,
    threaded: bool,
    bindable: Option<Bindable>,
    _phantom: PhantomData<fn(&P) -> T>,
}

impl<T, P> BindingBuilder<T, P>
where
    T: Send + Sync + 'static,
    P: 'static,
{
    fn new() -> Self {
        Self {
            tag: Tag::Default,
            overridable: false,
            immediate: false,
            threaded: true,
            bindable: None,
            _phantom: PhantomData,
        }
    }

    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn overridable(mut self, overridable: bool) -> Self {
        self.overridable = overridable;
        self
    }

    /// Create singleton instances when the context freezes
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Run asynchronous resolutions on the executor instead of inline
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    pub fn to_value(mut self, value: T) -> Self {
        self.bindable = Some(Bindable::value(value));
        self
    }

    pub fn to_shared(mut self, value: Arc<T>) -> Self {
        self.bindable = Some(Bindable::shared(value));
        self
    }

    pub fn to_factory<F>(mut self, make: F) -> Self
    where
        F: Fn(&P) -> T + Send + Sync + 'static,
    {
        self.bindable = Some(Bindable::factory(make));
        self
    }

    pub fn to_lambda<F>(mut self, make: F) -> Self
    where
        F: Fn(&Binding, &P) -> T + Send + Sync + 'static,
    {
        self.bindable = Some(Bindable::lambda(make));
        self
    }

    pub fn build(self) -> Binding {
        Binding {
            key: BindKey::of::<T, P>(self.tag),
            overridable: self.overridable,
            immediate: self.immediate,
            threaded: self.threaded,
            bindable: self.bindable,
            context: String::new(),
        }
    }
}

impl<T> BindingBuilder<T, ()>
where
    T: Send + Sync + 'static,
{
    pub fn to_provider<F>(mut self, make: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.bindable = Some(Bindable::provider(make));
        self
    }

    pub fn to_singleton<F>(mut self, make: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.bindable = Some(Bindable::singleton(make));
        self
    }
}

impl<T, P> BindingBuilder<T, P>
where
    T: Send + Sync + 'static,
    P: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn to_multiton<F>(mut self, make: F) -> Self
    where
        F: Fn(&P) -> T + Send + Sync + 'static,
    {
        self.bindable = Some(Bindable::multiton(make));
        self
    }
}
