//! Module loading, run once while a context freezes.
//!
//! Ordering happens entirely before the first lifecycle event, so a graph
//! problem leaves no trace. After that every step aborts the load on the
//! first failure; the caller rolls the context back.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::assets::{ArchiveAssets, AssetProvider, DirectoryAssets};
use crate::container::BindingCache;
use crate::context::Context;
use crate::events::{ModulesInitMid, ModulesInitPost, ModulesInitPre};
use crate::modules::definition::{Module, ModuleData, ModuleError};
use crate::modules::descriptors::{ModuleInfo, ModuleSource};
use crate::modules::registry::CodeRegistry;
use crate::modules::runtime::DependencyGraph;

/// Resolve, load and initialize `candidates` into `context`
pub(crate) fn check_and_load(
    context: &mut Context,
    candidates: Vec<ModuleInfo>,
) -> Result<usize, ModuleError> {
    let start_time = Instant::now();

    let mut graph = DependencyGraph::new();
    for ancestor in context.ancestors() {
        for module in ancestor.modules() {
            graph.add_external(module.info());
        }
    }
    for info in candidates {
        graph.add_module(info);
    }

    let order = graph.resolve()?;
    let keys: Vec<String> = order.iter().map(ModuleInfo::key).collect();
    let name = context.name().to_string();

    tracing::debug!(context = %name, order = ?keys, "Resolved module order");

    context.events.fire_event(
        ModulesInitPre {
            context: name.clone(),
            modules: keys.clone(),
        },
        &name,
        true,
    )?;

    for info in order {
        let data = construct_data(&info, &context.code)?;
        tracing::debug!(context = %name, module = %info.key(), data = data.kind(), "Constructed module data");

        if let Some(provider) = data.asset_provider() {
            context.assets.add_provider(provider);
        }

        if let Some(entry) = data.entry() {
            entry.pre_init(&info).map_err(|err| ModuleError::Lifecycle {
                module: info.key(),
                phase: "pre_init",
                reason: err.to_string(),
            })?;
        }

        register_bindings(&info, &context.code, &mut context.bindings)?;
        context.modules.push(Module::new(info, data));
    }

    context.events.fire_event(
        ModulesInitMid {
            context: name.clone(),
            modules: keys.clone(),
        },
        &name,
        true,
    )?;

    let frozen_view: &Context = context;
    for module in frozen_view.modules() {
        if let Some(entry) = module.data().entry() {
            entry
                .post_init(module, frozen_view)
                .map_err(|err| ModuleError::Lifecycle {
                    module: module.key(),
                    phase: "post_init",
                    reason: err.to_string(),
                })?;
        }
    }

    context.events.fire_event(
        ModulesInitPost {
            context: name.clone(),
            modules: keys.clone(),
        },
        &name,
        true,
    )?;

    tracing::info!(
        context = %name,
        modules = keys.len(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Modules loaded"
    );
    Ok(keys.len())
}

/// Pick the loading strategy for a module and build its data
fn construct_data(info: &ModuleInfo, code: &CodeRegistry) -> Result<ModuleData, ModuleError> {
    let fail = |reason: String| ModuleError::ModuleDataConstructionFailure {
        module: info.key(),
        reason,
    };

    if info.requires_code() {
        let entry = match &info.entry {
            Some(name) => Some(
                code.entry(name)
                    .ok_or_else(|| fail(format!("unknown entry point '{}'", name)))?,
            ),
            None => None,
        };
        let assets: Option<Arc<dyn AssetProvider>> = match (&info.source, &info.assets) {
            (ModuleSource::Directory(dir), Some(root)) => {
                Some(Arc::new(directory_assets(dir, root).map_err(fail)?))
            }
            (ModuleSource::Archive(path), Some(root)) => {
                Some(Arc::new(archive_assets(path, root).map_err(fail)?))
            }
            _ => None,
        };
        return Ok(ModuleData::Code { entry, assets });
    }

    Ok(match (&info.source, &info.assets) {
        (ModuleSource::Directory(dir), Some(root)) => {
            ModuleData::Directory(Arc::new(directory_assets(dir, root).map_err(fail)?))
        }
        (ModuleSource::Archive(path), Some(root)) => {
            ModuleData::Archive(Arc::new(archive_assets(path, root).map_err(fail)?))
        }
        _ => ModuleData::Empty,
    })
}

fn directory_assets(dir: &Path, root: &str) -> Result<DirectoryAssets, String> {
    let assets_root = dir.join(root);
    if !assets_root.is_dir() {
        return Err(format!(
            "asset root {} is not a directory",
            assets_root.display()
        ));
    }
    Ok(DirectoryAssets::new(assets_root))
}

fn archive_assets(archive: &Path, root: &str) -> Result<ArchiveAssets, String> {
    ArchiveAssets::open(archive, root).map_err(|err| err.to_string())
}

/// Register a code module's declared bindings.
///
/// A declared binding must replace an existing one unless it is marked `new`.
fn register_bindings(
    info: &ModuleInfo,
    code: &CodeRegistry,
    bindings: &mut BindingCache,
) -> Result<(), ModuleError> {
    for declared in &info.bindings {
        let binding = code.make_binding(info, declared)?;
        let fail = |reason: String| ModuleError::ModuleBindingRegistrationFailure {
            module: info.key(),
            binding: declared.to_string(),
            reason,
        };

        if !declared.new && !bindings.exists(binding.key(), true) {
            return Err(fail(format!(
                "{} is not bound yet; declare it with `new: true` to introduce it",
                binding.key()
            )));
        }

        bindings
            .add_binding(binding)
            .map_err(|err| fail(err.to_string()))?;
    }
    Ok(())
}
