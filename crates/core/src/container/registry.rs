use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;

use crate::context::Context;
use crate::foundation::FreezeState;

/// Errors raised by the named-object registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Object '{name}' of type {type_name} is already registered in context '{context}'")]
    Duplicate {
        name: String,
        type_name: &'static str,
        context: String,
    },

    #[error("Cannot register object '{name}' in context '{context}': context is frozen")]
    AlreadyFrozen { name: String, context: String },
}

type Objects = BTreeMap<String, Arc<dyn Any + Send + Sync>>;

/// Flat registry of named objects, partitioned by type, with parent fallback
pub struct ObjectRegistry {
    context: String,
    objects: HashMap<TypeId, Objects>,
    parent: Option<Arc<Context>>,
    state: FreezeState,
}

impl ObjectRegistry {
    pub(crate) fn new(context: &str, parent: Option<Arc<Context>>, state: FreezeState) -> Self {
        Self {
            context: context.to_string(),
            objects: HashMap::new(),
            parent,
            state,
        }
    }

    /// Register an object under `name`; fails on duplicates
    pub fn register<T: Send + Sync + 'static>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.state.is_frozen() {
            return Err(RegistryError::AlreadyFrozen {
                name,
                context: self.context.clone(),
            });
        }

        let objects = self.objects.entry(TypeId::of::<T>()).or_default();
        if objects.contains_key(&name) {
            return Err(RegistryError::Duplicate {
                name,
                type_name: std::any::type_name::<T>(),
                context: self.context.clone(),
            });
        }

        tracing::debug!(context = %self.context, name = %name, type_name = std::any::type_name::<T>(), "Registering object");
        objects.insert(name, Arc::new(value));
        Ok(())
    }

    /// Fetch an object; absent rather than failing
    pub fn fetch<T: Send + Sync + 'static>(&self, name: &str, elevate: bool) -> Option<Arc<T>> {
        let local = self
            .objects
            .get(&TypeId::of::<T>())
            .and_then(|objects| objects.get(name))
            .and_then(|object| object.clone().downcast::<T>().ok());

        match local {
            Some(object) => Some(object),
            None if elevate => self
                .parent
                .as_ref()
                .and_then(|parent| parent.objects().fetch::<T>(name, true)),
            None => None,
        }
    }

    /// Visit every object of type `T`: local ones by name, then ancestors'
    pub fn iterate<T, F>(&self, elevate: bool, mut visitor: F)
    where
        T: Send + Sync + 'static,
        F: FnMut(&str, &Arc<T>),
    {
        self.visit(elevate, &mut visitor);
    }

    fn visit<T, F>(&self, elevate: bool, visitor: &mut F)
    where
        T: Send + Sync + 'static,
        F: FnMut(&str, &Arc<T>),
    {
        if let Some(objects) = self.objects.get(&TypeId::of::<T>()) {
            for (name, object) in objects {
                if let Ok(object) = object.clone().downcast::<T>() {
                    visitor(name, &object);
                }
            }
        }

        if elevate {
            if let Some(parent) = &self.parent {
                parent.objects().visit(true, visitor);
            }
        }
    }

    /// Number of objects registered locally
    pub fn len(&self) -> usize {
        self.objects.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("context", &self.context)
            .field("objects", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Color(u8, u8, u8);

    #[test]
    fn test_register_and_fetch() {
        let mut registry = ObjectRegistry::new("root", None, FreezeState::new());
        registry.register("red", Color(255, 0, 0)).unwrap();
        registry.register("blue", Color(0, 0, 255)).unwrap();

        assert_eq!(*registry.fetch::<Color>("red", false).unwrap(), Color(255, 0, 0));
        assert!(registry.fetch::<Color>("green", true).is_none());
        // Same name, other type
        assert!(registry.fetch::<String>("red", false).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = ObjectRegistry::new("root", None, FreezeState::new());
        registry.register("red", Color(255, 0, 0)).unwrap();

        let err = registry.register("red", Color(1, 1, 1)).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { .. }));

        // A different type may reuse the name
        registry.register("red", "#ff0000".to_string()).unwrap();
    }

    #[test]
    fn test_iterate_in_name_order() {
        let mut registry = ObjectRegistry::new("root", None, FreezeState::new());
        registry.register("b", 2u32).unwrap();
        registry.register("a", 1u32).unwrap();
        registry.register("c", "other type").unwrap();

        let mut seen = Vec::new();
        registry.iterate::<u32, _>(true, |name, value| seen.push((name.to_string(), **value)));
        assert_eq!(seen, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn test_frozen_registry_rejects() {
        let state = FreezeState::new();
        let mut registry = ObjectRegistry::new("root", None, state.clone());
        state.freeze();
        assert!(matches!(
            registry.register("x", 1u8),
            Err(RegistryError::AlreadyFrozen { .. })
        ));
    }
}
