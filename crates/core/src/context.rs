//! Context tree.
//!
//! A [`Context`] owns one binding cache, event bus, object registry, asset
//! manager and module set, plus an optional shared reference to its parent.
//! It starts in the mutation phase and is frozen exactly once; afterwards it
//! only serves lookups, which may elevate to ancestors.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Instant;

use tokio::runtime::Handle;

use crate::assets::{AssetManager, AssetProvider};
use crate::config::{RuntimeConfig, RuntimeConfigTrait};
use crate::container::{Binding, BindingCache, BindingError, ObjectRegistry, Pending, Tag};
use crate::errors::{CoreError, Result};
use crate::events::{Event, EventBus, EventError, Listener, ListenerId};
use crate::foundation::{FreezeState, LifecycleState};
use crate::modules::loader;
use crate::modules::{CodeRegistry, Module, ModuleError, ModuleInfo, ModuleScanner};

pub struct Context {
    name: String,
    parent: Option<Arc<Context>>,
    state: FreezeState,
    executor: Option<Handle>,
    pub(crate) bindings: BindingCache,
    pub(crate) events: EventBus,
    pub(crate) objects: ObjectRegistry,
    pub(crate) assets: AssetManager,
    pub(crate) code: CodeRegistry,
    pub(crate) modules: Vec<Module>,
    scanner: ModuleScanner,
    declared: Vec<ModuleInfo>,
}

impl Context {
    /// Root context
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Child context of `parent`.
    ///
    /// The child inherits the parent's event types, executor, descriptor
    /// names and code registry; lookups it cannot answer may elevate to the
    /// parent.
    pub fn with_parent(name: impl Into<String>, parent: Arc<Context>) -> Self {
        let name = name.into();
        if !parent.is_frozen() {
            tracing::warn!(context = %name, parent = %parent.name(), "Parent context is not frozen");
        }

        let executor = parent.executor.clone();
        let mut context = Self::build(name, Some(parent));
        if let Some(executor) = executor {
            context.set_executor(executor);
        }
        context
    }

    /// Root context configured from `config`, with its module paths registered
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        config.validate()?;

        let mut context = Self::new(config.context_name.clone());
        context.scanner.set_descriptor_names(config.descriptor_names.clone());
        context.assets.set_chunk_size(config.async_read_chunk);
        for path in &config.module_paths {
            context.add_module_path(path.clone())?;
        }
        Ok(context)
    }

    fn build(name: String, parent: Option<Arc<Context>>) -> Self {
        let state = FreezeState::new();
        let (scanner, code) = match &parent {
            Some(parent) => (parent.scanner.without_paths(), parent.code.clone()),
            None => (ModuleScanner::default(), CodeRegistry::new()),
        };

        Self {
            bindings: BindingCache::new(&name, parent.clone(), state.clone()),
            events: EventBus::new(&name, parent.clone(), state.clone()),
            objects: ObjectRegistry::new(&name, parent.clone(), state.clone()),
            assets: AssetManager::new(&name, parent.clone()),
            code,
            modules: Vec::new(),
            scanner,
            declared: Vec::new(),
            executor: None,
            name,
            parent,
            state,
        }
    }

    /// Executor used for asynchronous binding resolution and asset reads
    pub fn with_executor(mut self, executor: Handle) -> Self {
        self.set_executor(executor);
        self
    }

    fn set_executor(&mut self, executor: Handle) {
        self.bindings.set_executor(executor.clone());
        self.assets.set_executor(executor.clone());
        self.executor = Some(executor);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    /// Parent, grandparent and so on up to the root
    pub fn ancestors(&self) -> impl Iterator<Item = &Context> {
        std::iter::successors(self.parent.as_deref(), |context| context.parent.as_deref())
    }

    pub fn is_frozen(&self) -> bool {
        self.state.is_frozen()
    }

    pub fn state(&self) -> LifecycleState {
        self.state.state()
    }

    pub fn bindings(&self) -> &BindingCache {
        &self.bindings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn assets(&self) -> &AssetManager {
        &self.assets
    }

    pub fn code_registry(&self) -> &CodeRegistry {
        &self.code
    }

    /// Loaded modules in load order
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Loaded module by name, searching this context only
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|module| module.name() == name)
    }

    fn check_mutable(&self) -> Result<()> {
        if self.state.is_frozen() {
            return Err(CoreError::AlreadyFrozen {
                context: self.name.clone(),
            });
        }
        Ok(())
    }

    pub fn add_binding(&mut self, binding: Binding) -> Result<()> {
        self.bindings.add_binding(binding)?;
        Ok(())
    }

    pub fn register_event<E: Event>(&mut self, name: &str) -> Result<bool> {
        Ok(self.events.register_event::<E>(name)?)
    }

    pub fn register_event_with_veto<E, F>(&mut self, name: &str, veto: F) -> Result<bool>
    where
        E: Event,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Ok(self.events.register_event_with_veto::<E, F>(name, veto)?)
    }

    pub fn register_listener<L: Listener>(
        &self,
        listener: &Arc<L>,
        thread: Option<ThreadId>,
    ) -> Result<ListenerId> {
        Ok(self.events.register_listener(listener, thread)?)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> usize {
        self.events.unregister_listener(id)
    }

    /// Register a module directory, archive, or directory of modules
    pub fn add_module_path(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.check_mutable().map_err(|_| self.modules_frozen())?;
        self.scanner.add_path(path);
        Ok(())
    }

    pub fn set_module_filter<F>(&mut self, filter: F) -> Result<()>
    where
        F: Fn(&ModuleInfo) -> bool + Send + Sync + 'static,
    {
        self.check_mutable().map_err(|_| self.modules_frozen())?;
        self.scanner.set_filter(Arc::new(filter));
        Ok(())
    }

    /// Add a module without a backing location
    pub fn add_module(&mut self, info: ModuleInfo) -> Result<()> {
        self.check_mutable().map_err(|_| self.modules_frozen())?;
        self.declared.push(info);
        Ok(())
    }

    fn modules_frozen(&self) -> CoreError {
        CoreError::Module(ModuleError::AlreadyFrozen {
            context: self.name.clone(),
        })
    }

    pub fn code_registry_mut(&mut self) -> Result<&mut CodeRegistry> {
        self.check_mutable()?;
        Ok(&mut self.code)
    }

    pub fn add_asset_provider(&mut self, provider: Arc<dyn AssetProvider>) -> Result<()> {
        self.check_mutable()?;
        self.assets.add_provider(provider);
        Ok(())
    }

    pub fn register_object<T: Send + Sync + 'static>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> Result<()> {
        self.objects.register(name, value)?;
        Ok(())
    }

    pub fn fetch_object<T: Send + Sync + 'static>(&self, name: &str, elevate: bool) -> Option<Arc<T>> {
        self.objects.fetch::<T>(name, elevate)
    }

    pub fn resolve<T, P>(
        &self,
        tag: impl Into<Tag>,
        param: &P,
        elevate: bool,
    ) -> std::result::Result<Arc<T>, BindingError>
    where
        T: Send + Sync + 'static,
        P: 'static,
    {
        self.bindings.resolve::<T, P>(tag, param, elevate)
    }

    /// Untagged, parameterless lookup with elevation
    pub fn resolve_default<T: Send + Sync + 'static>(
        &self,
    ) -> std::result::Result<Arc<T>, BindingError> {
        self.bindings.resolve_default::<T>()
    }

    pub fn resolve_async<T, P>(&self, tag: impl Into<Tag>, param: P, elevate: bool) -> Pending<Arc<T>>
    where
        T: Send + Sync + 'static,
        P: Send + 'static,
    {
        self.bindings.resolve_async::<T, P>(tag, param, elevate)
    }

    pub fn exists<T: 'static, P: 'static>(&self, tag: impl Into<Tag>, elevate: bool) -> bool {
        self.bindings.contains::<T, P>(tag, elevate)
    }

    /// Fire `event` with this context as the source
    pub fn fire_event<E: Event>(&self, event: E, escalate: bool) -> std::result::Result<E, EventError> {
        self.events.fire_event(event, &self.name, escalate)
    }

    /// Validate and load everything registered, then stop accepting changes.
    ///
    /// Scans the module paths, resolves and loads modules (firing the module
    /// lifecycle events) and creates `immediate` singletons. If any step
    /// fails, bindings, asset providers and modules added by this call are
    /// removed again and the context stays in the mutation phase.
    pub fn freeze(&mut self) -> Result<()> {
        self.check_mutable()?;
        let start_time = Instant::now();

        let bindings = self.bindings.snapshot();
        let providers = self.assets.provider_count();
        let modules = self.modules.len();

        if let Err(err) = self.load() {
            tracing::error!(context = %self.name, error = %err, "Context freeze failed");
            self.bindings.restore(bindings);
            self.assets.truncate(providers);
            self.modules.truncate(modules);
            return Err(err);
        }

        self.state.freeze();
        tracing::info!(
            context = %self.name,
            modules = self.modules.len(),
            bindings = self.bindings.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Context frozen"
        );
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let mut candidates = self.scanner.scan()?;
        candidates.extend(self.declared.iter().cloned());

        loader::check_and_load(self, candidates)?;

        let created = self.bindings.instantiate_immediate()?;
        if created > 0 {
            tracing::debug!(context = %self.name, created, "Created immediate singletons");
        }
        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|parent| parent.name()))
            .field("state", &self.state())
            .field("bindings", &self.bindings.len())
            .field(
                "modules",
                &self.modules.iter().map(Module::key).collect::<Vec<_>>(),
            )
            .finish()
    }
}
