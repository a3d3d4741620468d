//! Value-producing strategies behind a binding.
//!
//! Every variant is type-erased to `Instance` so the binding cache can store
//! heterogeneous bindings in one map; the typed constructors below capture the
//! concrete types and downcast the parameter on the way in.

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::container::binding::{Binding, BindingError};
use crate::container::descriptor::TypeInfo;

/// Type-erased instance produced by a binding
pub type Instance = Arc<dyn Any + Send + Sync>;

type ProviderFn = dyn Fn() -> Instance + Send + Sync;
type FactoryFn = dyn Fn(&dyn Any) -> Result<Instance, BindingError> + Send + Sync;
type LambdaFn = dyn Fn(&Binding, &dyn Any) -> Result<Instance, BindingError> + Send + Sync;

/// Kind of a bindable, as named in module descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindableKind {
    Value,
    Lambda,
    Provider,
    Factory,
    Singleton,
    Multiton,
}

impl BindableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindableKind::Value => "value",
            BindableKind::Lambda => "lambda",
            BindableKind::Provider => "provider",
            BindableKind::Factory => "factory",
            BindableKind::Singleton => "singleton",
            BindableKind::Multiton => "multiton",
        }
    }

    /// Whether instances are computed once and reused
    pub fn is_cached(&self) -> bool {
        matches!(
            self,
            BindableKind::Value | BindableKind::Singleton | BindableKind::Multiton
        )
    }
}

impl fmt::Display for BindableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BindableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(BindableKind::Value),
            "lambda" => Ok(BindableKind::Lambda),
            "provider" => Ok(BindableKind::Provider),
            "factory" => Ok(BindableKind::Factory),
            "singleton" => Ok(BindableKind::Singleton),
            "multiton" => Ok(BindableKind::Multiton),
            other => Err(format!(
                "unknown maker kind '{}', expected one of: value, singleton, multiton, provider, factory",
                other
            )),
        }
    }
}

/// Lazily computed single instance.
///
/// The factory must not resolve its own binding: re-entering the
/// `OnceLock` initialization from the same thread deadlocks.
pub struct SingletonCell {
    make: Box<ProviderFn>,
    instance: OnceLock<Instance>,
}

impl SingletonCell {
    fn get(&self) -> Instance {
        // OnceLock blocks concurrent first callers until the winner finishes
        self.instance.get_or_init(|| (self.make)()).clone()
    }

    /// Whether the instance has been created yet
    pub fn is_initialized(&self) -> bool {
        self.instance.get().is_some()
    }
}

/// Erased view of a [`MultitonCell`] for some parameter type
pub trait ErasedMultiton: Send + Sync {
    fn get(&self, param: &dyn Any) -> Result<Instance, BindingError>;

    /// Number of distinct parameters materialized so far
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazily computed instance per distinct parameter.
///
/// Warm reads go through the concurrent map; a miss takes the cell-wide
/// mutex and re-checks before calling the factory. The mutex is not
/// re-entrant, so a factory that resolves the same multiton binding (for
/// any parameter) on a cold path deadlocks.
pub struct MultitonCell<T, P> {
    make: Box<dyn Fn(&P) -> T + Send + Sync>,
    instances: DashMap<P, Instance>,
    cold: Mutex<()>,
}

impl<T, P> ErasedMultiton for MultitonCell<T, P>
where
    T: Send + Sync + 'static,
    P: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn get(&self, param: &dyn Any) -> Result<Instance, BindingError> {
        let param = downcast_param::<P>(param)?;

        if let Some(instance) = self.instances.get(param).map(|entry| entry.value().clone()) {
            return Ok(instance);
        }

        let _cold = self.cold.lock();
        if let Some(instance) = self.instances.get(param).map(|entry| entry.value().clone()) {
            return Ok(instance);
        }

        let instance: Instance = Arc::new((self.make)(param));
        self.instances.insert(param.clone(), instance.clone());
        Ok(instance)
    }

    fn len(&self) -> usize {
        self.instances.len()
    }
}

/// Value-producing strategy attached to a binding
#[derive(Clone)]
pub enum Bindable {
    /// Pre-computed instance, returned as the same `Arc` every time
    Value(Instance),
    /// Recomputed on every call with access to the owning binding
    Lambda(Arc<LambdaFn>),
    /// Parameterless, recomputed on every call
    Provider(Arc<ProviderFn>),
    /// Parameterized, recomputed on every call
    Factory(Arc<FactoryFn>),
    /// Computed on first call, then cached
    Singleton(Arc<SingletonCell>),
    /// Computed once per distinct parameter, then cached
    Multiton(Arc<dyn ErasedMultiton>),
}

impl Bindable {
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// Value binding sharing an existing `Arc`
    pub fn shared<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self::Value(value)
    }

    pub fn provider<T, F>(make: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::Provider(Arc::new(move || Arc::new(make()) as Instance))
    }

    pub fn factory<T, P, F>(make: F) -> Self
    where
        T: Send + Sync + 'static,
        P: 'static,
        F: Fn(&P) -> T + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(move |param: &dyn Any| {
            let param = downcast_param::<P>(param)?;
            Ok(Arc::new(make(param)) as Instance)
        }))
    }

    pub fn lambda<T, P, F>(make: F) -> Self
    where
        T: Send + Sync + 'static,
        P: 'static,
        F: Fn(&Binding, &P) -> T + Send + Sync + 'static,
    {
        Self::Lambda(Arc::new(move |binding: &Binding, param: &dyn Any| {
            let param = downcast_param::<P>(param)?;
            Ok(Arc::new(make(binding, param)) as Instance)
        }))
    }

    pub fn singleton<T, F>(make: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::Singleton(Arc::new(SingletonCell {
            make: Box::new(move || Arc::new(make()) as Instance),
            instance: OnceLock::new(),
        }))
    }

    pub fn multiton<T, P, F>(make: F) -> Self
    where
        T: Send + Sync + 'static,
        P: Eq + Hash + Clone + Send + Sync + 'static,
        F: Fn(&P) -> T + Send + Sync + 'static,
    {
        Self::Multiton(Arc::new(MultitonCell {
            make: Box::new(make),
            instances: DashMap::new(),
            cold: Mutex::new(()),
        }))
    }

    pub fn kind(&self) -> BindableKind {
        match self {
            Bindable::Value(_) => BindableKind::Value,
            Bindable::Lambda(_) => BindableKind::Lambda,
            Bindable::Provider(_) => BindableKind::Provider,
            Bindable::Factory(_) => BindableKind::Factory,
            Bindable::Singleton(_) => BindableKind::Singleton,
            Bindable::Multiton(_) => BindableKind::Multiton,
        }
    }

    /// Produce an instance for `param`
    pub fn get(&self, binding: &Binding, param: &dyn Any) -> Result<Instance, BindingError> {
        match self {
            Bindable::Value(instance) => Ok(instance.clone()),
            Bindable::Lambda(make) => make(binding, param),
            Bindable::Provider(make) => Ok(make()),
            Bindable::Factory(make) => make(param),
            Bindable::Singleton(cell) => Ok(cell.get()),
            Bindable::Multiton(cell) => cell.get(param),
        }
    }
}

impl fmt::Debug for Bindable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bindable::Singleton(cell) => f
                .debug_struct("Singleton")
                .field("initialized", &cell.is_initialized())
                .finish(),
            Bindable::Multiton(cell) => f
                .debug_struct("Multiton")
                .field("instances", &cell.len())
                .finish(),
            other => f.debug_tuple(other.kind().as_str()).field(&"<maker>").finish(),
        }
    }
}

fn downcast_param<P: 'static>(param: &dyn Any) -> Result<&P, BindingError> {
    param
        .downcast_ref::<P>()
        .ok_or_else(|| BindingError::TypeMismatch {
            expected: TypeInfo::of::<P>().name.to_string(),
            context: "binding parameter".to_string(),
        })
}
