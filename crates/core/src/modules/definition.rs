use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::assets::{ArchiveAssets, AssetProvider, DirectoryAssets};
use crate::context::Context;
use crate::errors::BoxError;
use crate::events::EventError;
use crate::modules::descriptors::ModuleInfo;

/// Module discovery, resolution and loading errors
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Cannot register modules in context '{context}': context is frozen")]
    AlreadyFrozen { context: String },

    #[error("Missing dependency '{dependency}' for module '{module}'")]
    MissingDependency { module: String, dependency: String },

    #[error("Circular dependency among [{}]: {}", .stuck.join(", "), .cycle.join(" -> "))]
    DependencyCycle {
        stuck: Vec<String>,
        cycle: Vec<String>,
    },

    #[error("Module '{module}' is declared twice: {first} and {second}")]
    DuplicateModule {
        module: String,
        first: String,
        second: String,
    },

    #[error("Cannot construct data for module '{module}': {reason}")]
    ModuleDataConstructionFailure { module: String, reason: String },

    #[error("Cannot register binding {binding} of module '{module}': {reason}")]
    ModuleBindingRegistrationFailure {
        module: String,
        binding: String,
        reason: String,
    },

    #[error("Invalid module descriptor {origin}: {}", .problems.join("; "))]
    DescriptorParseFailure {
        origin: String,
        problems: Vec<String>,
    },

    #[error("Cannot scan {}: {reason}", .path.display())]
    Scan { path: PathBuf, reason: String },

    #[error("Module '{module}' failed in {phase}: {reason}")]
    Lifecycle {
        module: String,
        phase: &'static str,
        reason: String,
    },

    #[error("Lifecycle event failed: {0}")]
    Event(#[from] EventError),

    #[error("{} module error(s): {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<ModuleError>),
}

fn join_errors(errors: &[ModuleError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ModuleError {
    /// Flattened view of every failure carried by this error
    pub fn failures(&self) -> Vec<&ModuleError> {
        match self {
            ModuleError::Aggregate(errors) => errors.iter().flat_map(|e| e.failures()).collect(),
            other => vec![other],
        }
    }

    pub fn has_cycle(&self) -> bool {
        self.failures()
            .iter()
            .any(|e| matches!(e, ModuleError::DependencyCycle { .. }))
    }

    pub fn has_missing_dependency(&self, dependency: &str) -> bool {
        self.failures().iter().any(|e| {
            matches!(e, ModuleError::MissingDependency { dependency: missing, .. } if missing.contains(dependency))
        })
    }

    /// Collapse a list of failures into one error
    pub(crate) fn aggregate(mut errors: Vec<ModuleError>) -> Option<ModuleError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(ModuleError::Aggregate(errors)),
        }
    }
}

/// Statically linked code behind a module's `entry` reference
pub trait ModuleEntry: Send + Sync {
    /// Runs before the module's bindings are registered
    fn pre_init(&self, _info: &ModuleInfo) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs after every module is loaded, between the mid and post events
    fn post_init(&self, _module: &Module, _context: &Context) -> Result<(), BoxError> {
        Ok(())
    }
}

/// How a loaded module's content is reached
#[derive(Clone)]
pub enum ModuleData {
    /// Module with an entry point and/or declared bindings
    Code {
        entry: Option<Arc<dyn ModuleEntry>>,
        assets: Option<Arc<dyn AssetProvider>>,
    },
    Directory(Arc<DirectoryAssets>),
    Archive(Arc<ArchiveAssets>),
    Empty,
}

impl ModuleData {
    pub fn kind(&self) -> &'static str {
        match self {
            ModuleData::Code { .. } => "code",
            ModuleData::Directory(_) => "directory",
            ModuleData::Archive(_) => "archive",
            ModuleData::Empty => "empty",
        }
    }

    pub fn entry(&self) -> Option<&Arc<dyn ModuleEntry>> {
        match self {
            ModuleData::Code { entry, .. } => entry.as_ref(),
            _ => None,
        }
    }

    pub fn asset_provider(&self) -> Option<Arc<dyn AssetProvider>> {
        match self {
            ModuleData::Code { assets, .. } => assets.clone(),
            ModuleData::Directory(assets) => Some(assets.clone()),
            ModuleData::Archive(assets) => Some(assets.clone()),
            ModuleData::Empty => None,
        }
    }
}

impl fmt::Debug for ModuleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleData::Code { entry, assets } => f
                .debug_struct("Code")
                .field("entry", &entry.is_some())
                .field("assets", &assets.as_ref().map(|a| a.describe()))
                .finish(),
            ModuleData::Directory(assets) => f.debug_tuple("Directory").field(assets).finish(),
            ModuleData::Archive(assets) => f.debug_tuple("Archive").field(assets).finish(),
            ModuleData::Empty => f.write_str("Empty"),
        }
    }
}

/// A successfully loaded module
#[derive(Debug, Clone)]
pub struct Module {
    info: ModuleInfo,
    data: ModuleData,
}

impl Module {
    pub(crate) fn new(info: ModuleInfo, data: ModuleData) -> Self {
        Self { info, data }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn version(&self) -> &str {
        &self.info.version
    }

    pub fn key(&self) -> String {
        self.info.key()
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    pub fn data(&self) -> &ModuleData {
        &self.data
    }
}
