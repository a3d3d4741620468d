use std::fmt;
use std::path::PathBuf;

/// Namespace used when a path carries none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Two-part asset address, written `namespace:path`.
///
/// The path part is normalized: leading slashes, empty segments, `.` and
/// `..` are dropped so an address can never escape its provider root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetPath {
    namespace: String,
    path: String,
}

impl AssetPath {
    pub fn new(namespace: impl Into<String>, path: &str) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: if namespace.is_empty() {
                DEFAULT_NAMESPACE.to_string()
            } else {
                namespace
            },
            path: sanitize(path),
        }
    }

    /// Parse `ns:path`; a bare path lands in the default namespace
    pub fn parse(address: &str) -> Self {
        match address.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::new(DEFAULT_NAMESPACE, address),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Address of the metadata document for this asset
    pub fn meta(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            path: format!("{}.meta", self.path),
        }
    }

    /// `namespace/path`, relative to a provider root
    pub fn relative(&self) -> PathBuf {
        let mut relative = PathBuf::from(&self.namespace);
        relative.extend(self.path.split('/'));
        relative
    }

    /// `namespace/path` with forward slashes, for archive entry names
    pub fn entry_name(&self) -> String {
        format!("{}/{}", self.namespace, self.path)
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl From<&str> for AssetPath {
    fn from(address: &str) -> Self {
        Self::parse(address)
    }
}

fn sanitize(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_namespace() {
        let path = AssetPath::parse("ui:icons/close.png");
        assert_eq!(path.namespace(), "ui");
        assert_eq!(path.path(), "icons/close.png");
        assert_eq!(path.to_string(), "ui:icons/close.png");
    }

    #[test]
    fn test_bare_path_uses_default_namespace() {
        let path = AssetPath::parse("readme.txt");
        assert_eq!(path.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(path.entry_name(), "default/readme.txt");
    }

    #[test]
    fn test_traversal_segments_are_dropped() {
        let path = AssetPath::parse("ui:../../etc/./passwd");
        assert_eq!(path.path(), "etc/passwd");
        assert_eq!(path.relative(), PathBuf::from("ui").join("etc").join("passwd"));
    }

    #[test]
    fn test_meta_address() {
        assert_eq!(AssetPath::parse("ui:a.png").meta().path(), "a.png.meta");
    }
}
