//! Namespaced asset lookup over module directories, archives and memory.

pub mod manager;
pub mod path;
pub mod provider;

pub use manager::AssetManager;
pub use path::AssetPath;
pub use provider::{ArchiveAssets, AssetProvider, DirectoryAssets, MemoryAssets};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Asset not found: {path}")]
    NotFound { path: String },

    #[error("Reading {path} was interrupted after {read} bytes")]
    Interrupted { path: String, read: usize },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error in {path}: {reason}")]
    Archive { path: String, reason: String },

    #[error("Invalid metadata for {path}: {reason}")]
    Metadata { path: String, reason: String },

    #[error("No executor available for asynchronous read: {message}")]
    Executor { message: String },
}

impl AssetError {
    /// Missing assets fall through to the next provider
    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::NotFound { .. })
    }

    pub(crate) fn not_found(path: &AssetPath) -> Self {
        AssetError::NotFound {
            path: path.to_string(),
        }
    }

    pub(crate) fn io(path: &AssetPath, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::not_found(path);
        }
        AssetError::Io {
            path: path.to_string(),
            source,
        }
    }
}
