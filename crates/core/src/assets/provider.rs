use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::assets::{AssetError, AssetPath};

/// A source answering existence, size and content queries for asset paths.
///
/// Every query reports a missing asset as [`AssetError::NotFound`] so callers
/// can fall through to the next provider.
pub trait AssetProvider: Send + Sync {
    /// Human readable origin, used in logs
    fn describe(&self) -> String;

    fn exists(&self, path: &AssetPath) -> bool;

    fn size(&self, path: &AssetPath) -> Result<u64, AssetError>;

    fn as_byte_stream(&self, path: &AssetPath) -> Result<Box<dyn Read + Send>, AssetError>;

    fn as_bytes(&self, path: &AssetPath) -> Result<Vec<u8>, AssetError> {
        let mut stream = self.as_byte_stream(path)?;
        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .map_err(|err| AssetError::io(path, err))?;
        Ok(bytes)
    }

    /// Buffered text stream; UTF-8 is checked as lines are read
    fn as_char_stream(&self, path: &AssetPath) -> Result<Box<dyn BufRead + Send>, AssetError> {
        Ok(Box::new(BufReader::new(self.as_byte_stream(path)?)))
    }
}

/// Assets laid out as `<root>/<namespace>/<path>` on the filesystem
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &AssetPath) -> PathBuf {
        self.root.join(path.relative())
    }
}

impl AssetProvider for DirectoryAssets {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    fn exists(&self, path: &AssetPath) -> bool {
        self.full_path(path).is_file()
    }

    fn size(&self, path: &AssetPath) -> Result<u64, AssetError> {
        let metadata = fs::metadata(self.full_path(path)).map_err(|err| AssetError::io(path, err))?;
        if !metadata.is_file() {
            return Err(AssetError::not_found(path));
        }
        Ok(metadata.len())
    }

    fn as_byte_stream(&self, path: &AssetPath) -> Result<Box<dyn Read + Send>, AssetError> {
        let full_path = self.full_path(path);
        if !full_path.is_file() {
            return Err(AssetError::not_found(path));
        }
        let file = File::open(full_path).map_err(|err| AssetError::io(path, err))?;
        Ok(Box::new(file))
    }

    fn as_bytes(&self, path: &AssetPath) -> Result<Vec<u8>, AssetError> {
        let full_path = self.full_path(path);
        if !full_path.is_file() {
            return Err(AssetError::not_found(path));
        }
        fs::read(full_path).map_err(|err| AssetError::io(path, err))
    }
}

/// Assets stored inside a zip archive under an optional root prefix.
///
/// Entry reads go through one mutex since the archive reader is stateful.
pub struct ArchiveAssets {
    archive: PathBuf,
    prefix: String,
    reader: Mutex<ZipArchive<File>>,
}

impl ArchiveAssets {
    pub fn open(archive: impl Into<PathBuf>, prefix: &str) -> Result<Self, AssetError> {
        let archive = archive.into();
        let display = archive.display().to_string();
        let file = File::open(&archive).map_err(|source| AssetError::Io {
            path: display.clone(),
            source,
        })?;
        let reader = ZipArchive::new(file).map_err(|err| AssetError::Archive {
            path: display,
            reason: err.to_string(),
        })?;

        Ok(Self {
            archive,
            prefix: prefix.trim_matches('/').to_string(),
            reader: Mutex::new(reader),
        })
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    fn entry_name(&self, path: &AssetPath) -> String {
        if self.prefix.is_empty() {
            path.entry_name()
        } else {
            format!("{}/{}", self.prefix, path.entry_name())
        }
    }

    fn archive_error(&self, path: &AssetPath, err: ZipError) -> AssetError {
        match err {
            ZipError::FileNotFound => AssetError::not_found(path),
            ZipError::Io(source) => AssetError::io(path, source),
            other => AssetError::Archive {
                path: format!("{} ({})", path, self.archive.display()),
                reason: other.to_string(),
            },
        }
    }
}

impl AssetProvider for ArchiveAssets {
    fn describe(&self) -> String {
        format!("archive {}", self.archive.display())
    }

    fn exists(&self, path: &AssetPath) -> bool {
        let name = self.entry_name(path);
        let exists = self.reader.lock().by_name(&name).map_or(false, |entry| !entry.is_dir());
        exists
    }

    fn size(&self, path: &AssetPath) -> Result<u64, AssetError> {
        let name = self.entry_name(path);
        let mut reader = self.reader.lock();
        let entry = reader
            .by_name(&name)
            .map_err(|err| self.archive_error(path, err))?;
        Ok(entry.size())
    }

    fn as_byte_stream(&self, path: &AssetPath) -> Result<Box<dyn Read + Send>, AssetError> {
        Ok(Box::new(Cursor::new(self.as_bytes(path)?)))
    }

    fn as_bytes(&self, path: &AssetPath) -> Result<Vec<u8>, AssetError> {
        let name = self.entry_name(path);
        let mut reader = self.reader.lock();
        let mut entry = reader
            .by_name(&name)
            .map_err(|err| self.archive_error(path, err))?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|err| AssetError::io(path, err))?;
        Ok(bytes)
    }
}

impl std::fmt::Debug for ArchiveAssets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveAssets")
            .field("archive", &self.archive)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// In-memory assets, mostly for tests and embedded defaults
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    name: String,
    entries: HashMap<AssetPath, Vec<u8>>,
}

impl MemoryAssets {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, address: &str, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert(AssetPath::parse(address), bytes.into());
        self
    }

    pub fn with(mut self, address: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(address, bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, path: &AssetPath) -> Result<&Vec<u8>, AssetError> {
        self.entries
            .get(path)
            .ok_or_else(|| AssetError::not_found(path))
    }
}

impl AssetProvider for MemoryAssets {
    fn describe(&self) -> String {
        format!("memory {}", self.name)
    }

    fn exists(&self, path: &AssetPath) -> bool {
        self.entries.contains_key(path)
    }

    fn size(&self, path: &AssetPath) -> Result<u64, AssetError> {
        Ok(self.entry(path)?.len() as u64)
    }

    fn as_byte_stream(&self, path: &AssetPath) -> Result<Box<dyn Read + Send>, AssetError> {
        Ok(Box::new(Cursor::new(self.entry(path)?.clone())))
    }

    fn as_bytes(&self, path: &AssetPath) -> Result<Vec<u8>, AssetError> {
        self.entry(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    #[test]
    fn test_directory_assets() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("ui")).unwrap();
        fs::write(dir.path().join("ui").join("hello.txt"), "hello\nworld\n").unwrap();

        let assets = DirectoryAssets::new(dir.path());
        let path = AssetPath::parse("ui:hello.txt");
        assert!(assets.exists(&path));
        assert_eq!(assets.size(&path).unwrap(), 12);
        assert_eq!(assets.as_bytes(&path).unwrap(), b"hello\nworld\n");

        let lines: Vec<String> = assets
            .as_char_stream(&path)
            .unwrap()
            .lines()
            .map(|line| line.unwrap())
            .collect();
        assert_eq!(lines, vec!["hello", "world"]);

        let missing = AssetPath::parse("ui:missing.txt");
        assert!(!assets.exists(&missing));
        assert!(assets.as_bytes(&missing).unwrap_err().is_not_found());
        assert!(assets.size(&missing).unwrap_err().is_not_found());
    }

    #[test]
    fn test_archive_assets_with_prefix() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("bundle.zip");
        {
            let mut writer = ZipWriter::new(File::create(&archive_path).unwrap());
            writer
                .start_file("assets/default/data.bin", FileOptions::default())
                .unwrap();
            writer.write_all(&[1, 2, 3, 4]).unwrap();
            writer.finish().unwrap();
        }

        let assets = ArchiveAssets::open(&archive_path, "assets/").unwrap();
        let path = AssetPath::parse("data.bin");
        assert!(assets.exists(&path));
        assert_eq!(assets.size(&path).unwrap(), 4);
        assert_eq!(assets.as_bytes(&path).unwrap(), vec![1, 2, 3, 4]);
        assert!(assets
            .as_bytes(&AssetPath::parse("other.bin"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_memory_assets() {
        let assets = MemoryAssets::new("defaults").with("cfg:app.json", "{}");
        let path = AssetPath::parse("cfg:app.json");
        assert!(assets.exists(&path));
        assert_eq!(assets.as_bytes(&path).unwrap(), b"{}");
        assert!(!assets.exists(&AssetPath::parse("app.json")));
    }
}
