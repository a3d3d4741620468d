use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zip::ZipArchive;

use crate::config::default_descriptor_names;
use crate::modules::definition::ModuleError;
use crate::modules::descriptors::{ModuleInfo, ModuleSource};

/// Pass/fail predicate applied to every discovered module
pub type ModuleFilter = Arc<dyn Fn(&ModuleInfo) -> bool + Send + Sync>;

const ARCHIVE_EXTENSIONS: [&str; 2] = ["zip", "jar"];

/// Finds module directories and archives under registered paths.
///
/// A registered path is either a module itself (a directory holding a
/// descriptor, or an archive) or a directory whose children are candidates.
#[derive(Clone)]
pub struct ModuleScanner {
    paths: Vec<PathBuf>,
    descriptor_names: Vec<String>,
    filter: Option<ModuleFilter>,
}

impl Default for ModuleScanner {
    fn default() -> Self {
        Self::new(default_descriptor_names())
    }
}

impl ModuleScanner {
    pub fn new(descriptor_names: Vec<String>) -> Self {
        Self {
            paths: Vec::new(),
            descriptor_names,
            filter: None,
        }
    }

    /// Same descriptor names, no paths and no filter
    pub fn without_paths(&self) -> Self {
        Self::new(self.descriptor_names.clone())
    }

    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn set_filter(&mut self, filter: ModuleFilter) {
        self.filter = Some(filter);
    }

    pub fn set_descriptor_names(&mut self, names: Vec<String>) {
        self.descriptor_names = names;
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Discover and parse every module under the registered paths
    pub fn scan(&self) -> Result<Vec<ModuleInfo>, ModuleError> {
        let mut found = Vec::new();
        let mut failures = Vec::new();

        for path in &self.paths {
            self.scan_path(path, &mut found, &mut failures);
        }

        if let Some(error) = ModuleError::aggregate(failures) {
            return Err(error);
        }

        let before = found.len();
        if let Some(filter) = &self.filter {
            found.retain(|info| {
                let accepted = filter(info);
                if !accepted {
                    tracing::debug!(module = %info.key(), "Module rejected by filter");
                }
                accepted
            });
        }

        tracing::debug!(
            paths = self.paths.len(),
            discovered = before,
            accepted = found.len(),
            "Scanned module paths"
        );
        Ok(found)
    }

    fn scan_path(&self, path: &Path, found: &mut Vec<ModuleInfo>, failures: &mut Vec<ModuleError>) {
        let mut record = |result: Result<Option<ModuleInfo>, ModuleError>| match result {
            Ok(Some(info)) => found.push(info),
            Ok(None) => {}
            Err(err) => failures.push(err),
        };

        if path.is_dir() {
            if self.descriptor_in(path).is_some() {
                record(self.read_directory(path));
                return;
            }

            let mut children = match fs::read_dir(path) {
                Ok(entries) => entries
                    .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                    .collect::<Vec<_>>(),
                Err(err) => {
                    record(Err(scan_error(path, err.to_string())));
                    return;
                }
            };
            children.sort();

            for child in children {
                if child.is_dir() {
                    record(self.read_directory(&child));
                } else if is_archive(&child) {
                    record(self.read_archive(&child));
                } else {
                    tracing::trace!(path = %child.display(), "Skipping non-module entry");
                }
            }
        } else if is_archive(path) {
            match self.read_archive(path) {
                Ok(None) => record(Err(scan_error(path, "archive has no module descriptor"))),
                other => record(other),
            }
        } else if path.exists() {
            record(Err(scan_error(path, "not a module directory or archive")));
        } else {
            record(Err(scan_error(path, "path does not exist")));
        }
    }

    fn descriptor_in(&self, dir: &Path) -> Option<(String, PathBuf)> {
        self.descriptor_names
            .iter()
            .map(|name| (name.clone(), dir.join(name)))
            .find(|(_, path)| path.is_file())
    }

    fn read_directory(&self, dir: &Path) -> Result<Option<ModuleInfo>, ModuleError> {
        let Some((name, descriptor)) = self.descriptor_in(dir) else {
            tracing::trace!(path = %dir.display(), "Directory has no module descriptor");
            return Ok(None);
        };

        let text = fs::read_to_string(&descriptor)
            .map_err(|err| scan_error(&descriptor, err.to_string()))?;
        let origin = descriptor.display().to_string();
        let info = ModuleInfo::from_file_contents(&name, &origin, &text)?;
        Ok(Some(info.with_source(ModuleSource::Directory(dir.to_path_buf()))))
    }

    fn read_archive(&self, path: &Path) -> Result<Option<ModuleInfo>, ModuleError> {
        let file = File::open(path).map_err(|err| scan_error(path, err.to_string()))?;
        let mut archive = ZipArchive::new(file).map_err(|err| scan_error(path, err.to_string()))?;

        for name in &self.descriptor_names {
            let mut entry = match archive.by_name(name) {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|err| scan_error(path, err.to_string()))?;

            let origin = format!("{}!{}", path.display(), name);
            let info = ModuleInfo::from_file_contents(name, &origin, &text)?;
            return Ok(Some(info.with_source(ModuleSource::Archive(path.to_path_buf()))));
        }

        tracing::trace!(path = %path.display(), "Archive has no module descriptor");
        Ok(None)
    }
}

fn is_archive(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| {
                ARCHIVE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
            })
}

fn scan_error(path: &Path, reason: impl Into<String>) -> ModuleError {
    ModuleError::Scan {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

impl fmt::Debug for ModuleScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleScanner")
            .field("paths", &self.paths)
            .field("descriptor_names", &self.descriptor_names)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}
