use std::fmt;
use std::io::{BufRead, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::runtime::Handle;

use crate::assets::{AssetError, AssetPath, AssetProvider};
use crate::context::Context;

/// Default chunk size for asynchronous reads
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Per-context asset facade.
///
/// Providers are consulted in registration order (module load order), then
/// the parent context's manager. A provider answering "not found" lets the
/// lookup fall through; any other failure stops it.
pub struct AssetManager {
    context: String,
    providers: Vec<Arc<dyn AssetProvider>>,
    parent: Option<Arc<Context>>,
    chunk_size: usize,
    executor: Option<Handle>,
}

impl AssetManager {
    pub(crate) fn new(context: &str, parent: Option<Arc<Context>>) -> Self {
        Self {
            context: context.to_string(),
            providers: Vec::new(),
            parent,
            chunk_size: DEFAULT_CHUNK_SIZE,
            executor: None,
        }
    }

    pub(crate) fn set_executor(&mut self, executor: Handle) {
        self.executor = Some(executor);
    }

    pub(crate) fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size.max(1);
    }

    pub(crate) fn add_provider(&mut self, provider: Arc<dyn AssetProvider>) {
        tracing::debug!(context = %self.context, provider = %provider.describe(), "Added asset provider");
        self.providers.push(provider);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.providers.truncate(len);
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn query<T>(
        &self,
        path: &AssetPath,
        ask: &dyn Fn(&dyn AssetProvider) -> Result<T, AssetError>,
    ) -> Result<T, AssetError> {
        for provider in &self.providers {
            match ask(provider.as_ref()) {
                Err(err) if err.is_not_found() => continue,
                other => return other,
            }
        }

        match &self.parent {
            Some(parent) => parent.assets().query(path, ask),
            None => Err(AssetError::not_found(path)),
        }
    }

    pub fn exists(&self, address: &str) -> bool {
        let path = AssetPath::parse(address);
        self.query(&path, &|provider| {
            if provider.exists(&path) {
                Ok(())
            } else {
                Err(AssetError::not_found(&path))
            }
        })
        .is_ok()
    }

    pub fn size(&self, address: &str) -> Result<u64, AssetError> {
        let path = AssetPath::parse(address);
        self.query(&path, &|provider| provider.size(&path))
    }

    pub fn as_bytes(&self, address: &str) -> Result<Vec<u8>, AssetError> {
        let path = AssetPath::parse(address);
        self.query(&path, &|provider| provider.as_bytes(&path))
    }

    pub fn as_string(&self, address: &str) -> Result<String, AssetError> {
        let bytes = self.as_bytes(address)?;
        String::from_utf8(bytes).map_err(|err| AssetError::Io {
            path: AssetPath::parse(address).to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        })
    }

    pub fn as_byte_stream(&self, address: &str) -> Result<Box<dyn Read + Send>, AssetError> {
        let path = AssetPath::parse(address);
        self.query(&path, &|provider| provider.as_byte_stream(&path))
    }

    pub fn as_char_stream(&self, address: &str) -> Result<Box<dyn BufRead + Send>, AssetError> {
        let path = AssetPath::parse(address);
        self.query(&path, &|provider| provider.as_char_stream(&path))
    }

    /// Decode `<address>.meta` as a JSON object
    pub fn metadata(&self, address: &str) -> Result<Map<String, Value>, AssetError> {
        let meta = AssetPath::parse(address).meta();
        let bytes = self.query(&meta, &|provider| provider.as_bytes(&meta))?;

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(AssetError::Metadata {
                path: meta.to_string(),
                reason: format!("expected an object at the root, found {}", json_kind(&other)),
            }),
            Err(err) => Err(AssetError::Metadata {
                path: meta.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    /// Read an asset in chunks on the executor.
    ///
    /// `interrupt` is checked before every chunk; once set the read stops
    /// with [`AssetError::Interrupted`].
    pub async fn read_async(
        &self,
        address: &str,
        interrupt: Arc<AtomicBool>,
    ) -> Result<Vec<u8>, AssetError> {
        let path = AssetPath::parse(address);
        let mut stream = self.as_byte_stream(address)?;
        let chunk_size = self.chunk_size;

        let executor = match self.executor.clone() {
            Some(executor) => executor,
            None => Handle::try_current().map_err(|err| AssetError::Executor {
                message: err.to_string(),
            })?,
        };

        let task = executor.spawn_blocking(move || {
            let mut bytes = Vec::new();
            let mut buffer = vec![0u8; chunk_size];
            loop {
                if interrupt.load(Ordering::Acquire) {
                    return Err(AssetError::Interrupted {
                        path: path.to_string(),
                        read: bytes.len(),
                    });
                }
                let read = stream
                    .read(&mut buffer)
                    .map_err(|err| AssetError::io(&path, err))?;
                if read == 0 {
                    return Ok(bytes);
                }
                bytes.extend_from_slice(&buffer[..read]);
            }
        });

        task.await.map_err(|err| AssetError::Executor {
            message: err.to_string(),
        })?
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetManager")
            .field("context", &self.context)
            .field(
                "providers",
                &self.providers.iter().map(|p| p.describe()).collect::<Vec<_>>(),
            )
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;

    fn manager() -> AssetManager {
        let mut manager = AssetManager::new("test", None);
        manager.add_provider(Arc::new(
            MemoryAssets::new("first")
                .with("ui:logo.svg", "<svg/>")
                .with("ui:logo.svg.meta", r#"{"width": 32}"#)
                .with("ui:bad.meta", "[1, 2]"),
        ));
        manager.add_provider(Arc::new(
            MemoryAssets::new("second")
                .with("ui:logo.svg", "shadowed")
                .with("notes.txt", "second provider"),
        ));
        manager
    }

    #[test]
    fn test_first_provider_wins_and_misses_fall_through() {
        let manager = manager();
        assert_eq!(manager.as_string("ui:logo.svg").unwrap(), "<svg/>");
        assert_eq!(manager.as_string("notes.txt").unwrap(), "second provider");
        assert!(manager.exists("default:notes.txt"));
        assert!(!manager.exists("missing.txt"));
        assert!(manager.size("missing.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_metadata_requires_object_root() {
        let manager = manager();
        let meta = manager.metadata("ui:logo.svg").unwrap();
        assert_eq!(meta["width"], 32);

        assert!(matches!(
            manager.metadata("ui:bad"),
            Err(AssetError::Metadata { .. })
        ));
        assert!(manager.metadata("notes.txt").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_read_async_in_chunks() {
        let mut manager = manager();
        manager.set_chunk_size(2);
        let bytes = manager
            .read_async("ui:logo.svg", Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        assert_eq!(bytes, b"<svg/>");
    }

    #[tokio::test]
    async fn test_read_async_interrupted() {
        let manager = manager();
        let err = manager
            .read_async("ui:logo.svg", Arc::new(AtomicBool::new(true)))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::Interrupted { read: 0, .. }));
    }
}
