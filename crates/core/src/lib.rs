pub mod assets;
pub mod config;
pub mod container;
pub mod context;
pub mod errors;
pub mod events;
pub mod foundation;
pub mod modules;

// Re-export key types for convenience
pub use assets::{AssetError, AssetManager, AssetPath, AssetProvider};
pub use config::{ConfigError, ConfigSource, RuntimeConfig, RuntimeConfigTrait};
pub use container::{
    BindKey, Bindable, BindableKind, Binding, BindingCache, BindingError, ObjectRegistry, Pending,
    RegistryError, Tag,
};
pub use context::Context;
pub use errors::{BoxError, CoreError, Result};
pub use events::{
    Event, EventBus, EventError, Handlers, Listener, ListenerId, ModulesInitMid, ModulesInitPost,
    ModulesInitPre,
};
pub use foundation::LifecycleState;
pub use modules::{CodeRegistry, DeclaredBinding, Module, ModuleData, ModuleEntry, ModuleError, ModuleInfo};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get runtime version
pub fn version() -> &'static str {
    VERSION
}
