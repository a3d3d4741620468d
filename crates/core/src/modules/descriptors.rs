//! Module descriptors.
//!
//! A descriptor is a JSON or YAML document at the module root. Both formats
//! decode into a generic document first and then go through one field-by-field
//! validator that collects every problem before failing, so a broken
//! descriptor is reported in full.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::container::{BindableKind, Tag};
use crate::modules::ModuleError;

/// Where a module was discovered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum ModuleSource {
    Directory(PathBuf),
    Archive(PathBuf),
    /// Added programmatically, no backing location
    Virtual,
}

impl ModuleSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ModuleSource::Directory(path) | ModuleSource::Archive(path) => Some(path),
            ModuleSource::Virtual => None,
        }
    }
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::Directory(path) => write!(f, "directory {}", path.display()),
            ModuleSource::Archive(path) => write!(f, "archive {}", path.display()),
            ModuleSource::Virtual => f.write_str("<virtual>"),
        }
    }
}

/// Exact `(name, version)` requirement on another module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleDependency {
    pub name: String,
    pub version: String,
}

impl ModuleDependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn key(&self) -> String {
        module_key(&self.name, &self.version)
    }
}

/// Binding a code-bearing module contributes to its context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredBinding {
    /// Tag of the binding; empty means the default tag
    pub name: String,
    pub bound_type: String,
    pub param_type: String,
    pub maker_kind: BindableKind,
    pub maker_type: String,
    /// Allows introducing a binding that does not exist yet
    #[serde(default)]
    pub new: bool,
}

impl DeclaredBinding {
    pub fn new(
        bound_type: impl Into<String>,
        maker_kind: BindableKind,
        maker_type: impl Into<String>,
    ) -> Self {
        Self {
            name: String::new(),
            bound_type: bound_type.into(),
            param_type: "()".to_string(),
            maker_kind,
            maker_type: maker_type.into(),
            new: false,
        }
    }

    pub fn tagged(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_param(mut self, param_type: impl Into<String>) -> Self {
        self.param_type = param_type.into();
        self
    }

    pub fn allow_new(mut self) -> Self {
        self.new = true;
        self
    }

    pub fn tag(&self) -> Tag {
        Tag::from_declared(&self.name)
    }
}

impl fmt::Display for DeclaredBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) #{} as {} via {}",
            self.bound_type,
            self.param_type,
            self.tag(),
            self.maker_kind,
            self.maker_type
        )
    }
}

/// Parsed module descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub version: String,
    pub authors: Vec<String>,
    pub assets: Option<String>,
    pub entry: Option<String>,
    pub dependencies: Vec<ModuleDependency>,
    pub bindings: Vec<DeclaredBinding>,
    pub source: ModuleSource,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            authors: Vec::new(),
            assets: None,
            entry: None,
            dependencies: Vec::new(),
            bindings: Vec::new(),
            source: ModuleSource::Virtual,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_assets(mut self, root: impl Into<String>) -> Self {
        self.assets = Some(root.into());
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.dependencies.push(ModuleDependency::new(name, version));
        self
    }

    pub fn with_binding(mut self, binding: DeclaredBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn with_source(mut self, source: ModuleSource) -> Self {
        self.source = source;
        self
    }

    /// `name-version`, the identity used for dependency resolution
    pub fn key(&self) -> String {
        module_key(&self.name, &self.version)
    }

    /// Whether loading needs the code registry
    pub fn requires_code(&self) -> bool {
        self.entry.is_some() || !self.bindings.is_empty()
    }

    pub fn from_json(origin: &str, text: &str) -> Result<Self, ModuleError> {
        let document: Value =
            serde_json::from_str(text).map_err(|err| ModuleError::DescriptorParseFailure {
                origin: origin.to_string(),
                problems: vec![format!("invalid JSON: {}", err)],
            })?;
        Self::from_document(origin, &document)
    }

    pub fn from_yaml(origin: &str, text: &str) -> Result<Self, ModuleError> {
        let document: Value =
            serde_yaml::from_str(text).map_err(|err| ModuleError::DescriptorParseFailure {
                origin: origin.to_string(),
                problems: vec![format!("invalid YAML: {}", err)],
            })?;
        Self::from_document(origin, &document)
    }

    /// Parse by file name: `.json` is JSON, anything else YAML
    pub fn from_file_contents(file_name: &str, origin: &str, text: &str) -> Result<Self, ModuleError> {
        if file_name.ends_with(".json") {
            Self::from_json(origin, text)
        } else {
            Self::from_yaml(origin, text)
        }
    }

    pub fn from_document(origin: &str, document: &Value) -> Result<Self, ModuleError> {
        let mut problems = Vec::new();

        let Some(root) = document.as_object() else {
            return Err(ModuleError::DescriptorParseFailure {
                origin: origin.to_string(),
                problems: vec!["descriptor root must be an object".to_string()],
            });
        };

        let name = required_string(root, "name", &mut problems);
        let version = required_string(root, "version", &mut problems);
        let authors = parse_authors(root, &mut problems);
        let assets = optional_string(root, "assets", &mut problems);
        let entry = optional_string(root, "entry", &mut problems);
        let dependencies = parse_dependencies(root, &mut problems);
        let bindings = parse_bindings(root, &mut problems);

        if !problems.is_empty() {
            return Err(ModuleError::DescriptorParseFailure {
                origin: origin.to_string(),
                problems,
            });
        }

        Ok(Self {
            name,
            version,
            authors,
            assets,
            entry,
            dependencies,
            bindings,
            source: ModuleSource::Virtual,
        })
    }
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key(), self.source)
    }
}

pub(crate) fn module_key(name: &str, version: &str) -> String {
    format!("{}-{}", name, version)
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn string_at(
    object: &Map<String, Value>,
    field: &str,
    path: &str,
    required: bool,
    problems: &mut Vec<String>,
) -> Option<String> {
    match object.get(field) {
        Some(Value::String(value)) => Some(value.clone()),
        Some(Value::Null) | None => {
            if required {
                problems.push(format!("{}{}: required field is missing", path, field));
            }
            None
        }
        Some(other) => {
            problems.push(format!(
                "{}{}: expected string, found {}",
                path,
                field,
                describe(other)
            ));
            None
        }
    }
}

fn required_string(root: &Map<String, Value>, field: &str, problems: &mut Vec<String>) -> String {
    let value = string_at(root, field, "", true, problems).unwrap_or_default();
    if value.trim().is_empty() && root.get(field).map_or(false, Value::is_string) {
        problems.push(format!("{}: must not be empty", field));
    }
    value
}

fn optional_string(
    root: &Map<String, Value>,
    field: &str,
    problems: &mut Vec<String>,
) -> Option<String> {
    string_at(root, field, "", false, problems)
}

fn parse_authors(root: &Map<String, Value>, problems: &mut Vec<String>) -> Vec<String> {
    match root.get("author") {
        Some(Value::String(author)) => vec![author.clone()],
        Some(Value::Array(authors)) => authors
            .iter()
            .enumerate()
            .filter_map(|(index, author)| match author {
                Value::String(author) => Some(author.clone()),
                other => {
                    problems.push(format!(
                        "author[{}]: expected string, found {}",
                        index,
                        describe(other)
                    ));
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => {
            problems.push("author: required field is missing".to_string());
            Vec::new()
        }
        Some(other) => {
            problems.push(format!(
                "author: expected string or array of strings, found {}",
                describe(other)
            ));
            Vec::new()
        }
    }
}

fn array_of_objects<'a>(
    root: &'a Map<String, Value>,
    field: &str,
    problems: &mut Vec<String>,
) -> Vec<(usize, &'a Map<String, Value>)> {
    match root.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match item {
                Value::Object(object) => Some((index, object)),
                other => {
                    problems.push(format!(
                        "{}[{}]: expected object, found {}",
                        field,
                        index,
                        describe(other)
                    ));
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            problems.push(format!("{}: expected array, found {}", field, describe(other)));
            Vec::new()
        }
    }
}

fn parse_dependencies(
    root: &Map<String, Value>,
    problems: &mut Vec<String>,
) -> Vec<ModuleDependency> {
    array_of_objects(root, "dependencies", problems)
        .into_iter()
        .filter_map(|(index, object)| {
            let path = format!("dependencies[{}].", index);
            let name = string_at(object, "name", &path, true, problems);
            let version = string_at(object, "version", &path, true, problems);
            Some(ModuleDependency::new(name?, version?))
        })
        .collect()
}

fn parse_bindings(root: &Map<String, Value>, problems: &mut Vec<String>) -> Vec<DeclaredBinding> {
    array_of_objects(root, "bindings", problems)
        .into_iter()
        .filter_map(|(index, object)| {
            let path = format!("bindings[{}].", index);
            let name = string_at(object, "name", &path, true, problems);
            let bound_type = string_at(object, "bound_type", &path, true, problems);
            let param_type = string_at(object, "param_type", &path, true, problems);
            let maker_type = string_at(object, "maker_type", &path, true, problems);
            let maker_kind = string_at(object, "maker_kind", &path, true, problems)
                .and_then(|kind| match kind.parse::<BindableKind>() {
                    Ok(BindableKind::Lambda) => {
                        problems.push(format!(
                            "{}maker_kind: lambda bindings cannot be declared by modules",
                            path
                        ));
                        None
                    }
                    Ok(kind) => Some(kind),
                    Err(reason) => {
                        problems.push(format!("{}maker_kind: {}", path, reason));
                        None
                    }
                });
            let new = match object.get("new") {
                Some(Value::Bool(new)) => *new,
                Some(Value::Null) | None => false,
                Some(other) => {
                    problems.push(format!(
                        "{}new: expected boolean, found {}",
                        path,
                        describe(other)
                    ));
                    false
                }
            };

            Some(DeclaredBinding {
                name: name?,
                bound_type: bound_type?,
                param_type: param_type?,
                maker_kind: maker_kind?,
                maker_type: maker_type?,
                new,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "name": "storage",
        "author": ["Ada", "Grace"],
        "version": "1.2.0",
        "assets": "res",
        "entry": "storage::Entry",
        "dependencies": [{"name": "core", "version": "1.0"}],
        "bindings": [
            {"name": "", "bound_type": "Store", "param_type": "()",
             "maker_kind": "singleton", "maker_type": "store", "new": true}
        ]
    }"#;

    #[test]
    fn test_parse_full_json_descriptor() {
        let info = ModuleInfo::from_json("module.json", FULL).unwrap();
        assert_eq!(info.key(), "storage-1.2.0");
        assert_eq!(info.authors, vec!["Ada", "Grace"]);
        assert_eq!(info.assets.as_deref(), Some("res"));
        assert_eq!(info.dependencies[0].key(), "core-1.0");
        assert_eq!(info.bindings[0].maker_kind, BindableKind::Singleton);
        assert_eq!(info.bindings[0].tag(), Tag::Default);
        assert!(info.bindings[0].new);
        assert!(info.requires_code());
    }

    #[test]
    fn test_parse_yaml_descriptor() {
        let yaml = "name: ui\nauthor: Linus\nversion: '0.1'\nassets: assets\n";
        let info = ModuleInfo::from_yaml("module.yaml", yaml).unwrap();
        assert_eq!(info.authors, vec!["Linus"]);
        assert!(!info.requires_code());
        assert!(info.dependencies.is_empty());
    }

    #[test]
    fn test_all_problems_are_reported_together() {
        let broken = r#"{
            "author": 7,
            "dependencies": [{"name": "core"}, 3],
            "bindings": [{"name": "x", "bound_type": "T", "param_type": "()",
                          "maker_kind": "lambda", "maker_type": "m", "new": "yes"}]
        }"#;

        match ModuleInfo::from_json("broken.json", broken) {
            Err(ModuleError::DescriptorParseFailure { origin, problems }) => {
                assert_eq!(origin, "broken.json");
                let joined = problems.join("\n");
                assert!(joined.contains("name: required field is missing"));
                assert!(joined.contains("version: required field is missing"));
                assert!(joined.contains("author: expected string or array"));
                assert!(joined.contains("dependencies[0].version"));
                assert!(joined.contains("dependencies[1]: expected object"));
                assert!(joined.contains("bindings[0].maker_kind"));
                assert!(joined.contains("bindings[0].new"));
                assert_eq!(problems.len(), 7);
            }
            other => panic!("expected DescriptorParseFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_root_is_rejected() {
        assert!(matches!(
            ModuleInfo::from_yaml("module.yml", "- a\n- b\n"),
            Err(ModuleError::DescriptorParseFailure { .. })
        ));
    }
}
