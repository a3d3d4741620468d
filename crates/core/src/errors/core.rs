use thiserror::Error;

use crate::assets::AssetError;
use crate::config::ConfigError;
use crate::container::{BindingError, RegistryError};
use crate::events::EventError;
use crate::modules::ModuleError;

/// Boxed error used for user-supplied callbacks (handlers, lambdas, entry hooks)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Core error type for the runtime
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Context '{context}' is already frozen")]
    AlreadyFrozen { context: String },
}

impl CoreError {
    /// Check if the error reports a registration attempted after freeze
    pub fn is_already_frozen(&self) -> bool {
        match self {
            Self::AlreadyFrozen { .. } => true,
            Self::Binding(BindingError::AlreadyFrozen { .. }) => true,
            Self::Event(EventError::AlreadyFrozen { .. }) => true,
            Self::Module(ModuleError::AlreadyFrozen { .. }) => true,
            Self::Registry(RegistryError::AlreadyFrozen { .. }) => true,
            _ => false,
        }
    }

    /// Check if the error came out of module resolution or loading
    pub fn is_module(&self) -> bool {
        matches!(self, Self::Module(_))
    }

    /// Check if the error came out of binding registration or resolution
    pub fn is_binding(&self) -> bool {
        matches!(self, Self::Binding(_))
    }
}

/// Result alias defaulting to [`CoreError`]
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
