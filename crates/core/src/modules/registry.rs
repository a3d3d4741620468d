//! Statically linked code for code-bearing modules.
//!
//! Module descriptors refer to entry points, types and makers by name. The
//! embedding application registers those names here before freezing, and the
//! loader turns a descriptor's declared bindings into typed bindings through
//! them.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::container::{BindKey, Bindable, BindableKind, Binding, TypeInfo};
use crate::modules::definition::{ModuleEntry, ModuleError};
use crate::modules::descriptors::{DeclaredBinding, ModuleInfo};

type MakeFn = dyn Fn(BindableKind) -> Option<Bindable> + Send + Sync;

#[derive(Clone)]
struct Maker {
    result: TypeInfo,
    /// `None` for suppliers, which take no parameter
    param: Option<TypeInfo>,
    make: Arc<MakeFn>,
}

/// Named entry points, types and makers available to module descriptors
#[derive(Clone)]
pub struct CodeRegistry {
    entries: HashMap<String, Arc<dyn ModuleEntry>>,
    types: HashMap<String, TypeInfo>,
    makers: HashMap<String, Maker>,
}

impl Default for CodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeRegistry {
    /// Registry pre-populated with the primitive type names
    pub fn new() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
            types: HashMap::new(),
            makers: HashMap::new(),
        };
        registry
            .register_type::<()>("()")
            .register_type::<String>("String")
            .register_type::<bool>("bool")
            .register_type::<i32>("i32")
            .register_type::<i64>("i64")
            .register_type::<u32>("u32")
            .register_type::<u64>("u64")
            .register_type::<usize>("usize")
            .register_type::<f64>("f64");
        registry
    }

    pub fn register_entry(
        &mut self,
        name: impl Into<String>,
        entry: impl ModuleEntry + 'static,
    ) -> &mut Self {
        self.entries.insert(name.into(), Arc::new(entry));
        self
    }

    pub fn register_type<T: ?Sized + 'static>(&mut self, name: impl Into<String>) -> &mut Self {
        self.types.insert(name.into(), TypeInfo::of::<T>());
        self
    }

    /// Parameterless maker usable as `value`, `singleton` or `provider`
    pub fn register_supplier<T, F>(&mut self, name: impl Into<String>, make: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let make = Arc::new(make);
        let build = move |kind: BindableKind| {
            let make = Arc::clone(&make);
            match kind {
                BindableKind::Value => Some(Bindable::value(make())),
                BindableKind::Singleton => Some(Bindable::singleton(move || make())),
                BindableKind::Provider => Some(Bindable::provider(move || make())),
                _ => None,
            }
        };

        self.makers.insert(
            name.into(),
            Maker {
                result: TypeInfo::of::<T>(),
                param: None,
                make: Arc::new(build),
            },
        );
        self
    }

    /// Parameterized maker usable as `multiton` or `factory`
    pub fn register_function<T, P, F>(&mut self, name: impl Into<String>, make: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        P: Eq + Hash + Clone + Send + Sync + 'static,
        F: Fn(&P) -> T + Send + Sync + 'static,
    {
        let make = Arc::new(make);
        let build = move |kind: BindableKind| {
            let make = Arc::clone(&make);
            match kind {
                BindableKind::Multiton => Some(Bindable::multiton(move |param: &P| make(param))),
                BindableKind::Factory => Some(Bindable::factory(move |param: &P| make(param))),
                _ => None,
            }
        };

        self.makers.insert(
            name.into(),
            Maker {
                result: TypeInfo::of::<T>(),
                param: Some(TypeInfo::of::<P>()),
                make: Arc::new(build),
            },
        );
        self
    }

    pub fn entry(&self, name: &str) -> Option<Arc<dyn ModuleEntry>> {
        self.entries.get(name).cloned()
    }

    pub fn type_info(&self, name: &str) -> Option<TypeInfo> {
        self.types.get(name).copied()
    }

    pub fn has_maker(&self, name: &str) -> bool {
        self.makers.contains_key(name)
    }

    /// Resolve the key a declared binding would occupy
    pub fn declared_key(
        &self,
        module: &ModuleInfo,
        declared: &DeclaredBinding,
    ) -> Result<BindKey, ModuleError> {
        let fail = |reason: String| binding_failure(module, declared, reason);

        let result = self
            .type_info(&declared.bound_type)
            .ok_or_else(|| fail(format!("unknown bound type '{}'", declared.bound_type)))?;
        let param = self
            .type_info(&declared.param_type)
            .ok_or_else(|| fail(format!("unknown parameter type '{}'", declared.param_type)))?;

        Ok(BindKey::new(result, param, declared.tag()))
    }

    /// Build the binding a module declares.
    ///
    /// Module bindings are never overridable and resolve on the executor.
    pub fn make_binding(
        &self,
        module: &ModuleInfo,
        declared: &DeclaredBinding,
    ) -> Result<Binding, ModuleError> {
        let fail = |reason: String| binding_failure(module, declared, reason);
        let key = self.declared_key(module, declared)?;

        let maker = self
            .makers
            .get(&declared.maker_type)
            .ok_or_else(|| fail(format!("unknown maker '{}'", declared.maker_type)))?;

        if maker.result != key.result {
            return Err(fail(format!(
                "maker '{}' produces {}, not {}",
                declared.maker_type, maker.result, key.result
            )));
        }

        match maker.param {
            Some(param) if param != key.param => {
                return Err(fail(format!(
                    "maker '{}' takes {}, not {}",
                    declared.maker_type, param, key.param
                )));
            }
            None if !key.param.is::<()>() => {
                return Err(fail(format!(
                    "maker '{}' takes no parameter, but {} was declared",
                    declared.maker_type, key.param
                )));
            }
            _ => {}
        }

        let bindable = (maker.make)(declared.maker_kind).ok_or_else(|| {
            fail(format!(
                "maker '{}' cannot produce a {} binding",
                declared.maker_type, declared.maker_kind
            ))
        })?;

        Ok(Binding::erased(key, Some(bindable)).with_flags(false, false, true))
    }
}

fn binding_failure(module: &ModuleInfo, declared: &DeclaredBinding, reason: String) -> ModuleError {
    ModuleError::ModuleBindingRegistrationFailure {
        module: module.key(),
        binding: declared.to_string(),
        reason,
    }
}

impl fmt::Debug for CodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.entries.keys().collect();
        let mut types: Vec<_> = self.types.keys().collect();
        let mut makers: Vec<_> = self.makers.keys().collect();
        entries.sort();
        types.sort();
        makers.sort();
        f.debug_struct("CodeRegistry")
            .field("entries", &entries)
            .field("types", &types)
            .field("makers", &makers)
            .finish()
    }
}
