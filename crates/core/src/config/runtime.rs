use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigSource};

pub const ENV_CONTEXT_NAME: &str = "KOMOINEN_CONTEXT_NAME";
pub const ENV_MODULE_PATH: &str = "KOMOINEN_MODULE_PATH";
pub const ENV_DESCRIPTOR_NAMES: &str = "KOMOINEN_DESCRIPTOR_NAMES";
pub const ENV_LOG_LEVEL: &str = "KOMOINEN_LOG_LEVEL";
pub const ENV_ASSET_CHUNK: &str = "KOMOINEN_ASSET_CHUNK";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Configuration loading contract
pub trait RuntimeConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Settings for a root context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub context_name: String,
    pub module_paths: Vec<PathBuf>,
    pub descriptor_names: Vec<String>,
    pub log_level: String,
    pub async_read_chunk: usize,
    /// File this configuration was read from and the fields it set
    #[serde(skip)]
    origin: Option<FileOrigin>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileOrigin {
    path: PathBuf,
    fields: Vec<String>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self {
            context_name: "root".to_string(),
            module_paths: Vec::new(),
            descriptor_names: default_descriptor_names(),
            log_level: "info".to_string(),
            async_read_chunk: crate::assets::manager::DEFAULT_CHUNK_SIZE,
            origin: None,
        }
    }

    /// Load from a JSON or YAML file, chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let (mut config, fields): (Self, Vec<String>) =
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => {
                    let document: serde_json::Value = serde_json::from_str(&text)?;
                    let fields = document
                        .as_object()
                        .map(|root| root.keys().cloned().collect())
                        .unwrap_or_default();
                    (serde_json::from_value(document)?, fields)
                }
                _ => {
                    let document: serde_yaml::Value = serde_yaml::from_str(&text)?;
                    let fields = document
                        .as_mapping()
                        .map(|root| {
                            root.keys()
                                .filter_map(|key| key.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    (serde_yaml::from_value(document)?, fields)
                }
            };
        config.origin = Some(FileOrigin {
            path: path.to_path_buf(),
            fields,
        });
        config.validate()?;
        Ok(config)
    }

    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_paths.push(path.into());
        self
    }
}

fn field_for(var: &str) -> &'static str {
    match var {
        ENV_CONTEXT_NAME => "context_name",
        ENV_MODULE_PATH => "module_paths",
        ENV_DESCRIPTOR_NAMES => "descriptor_names",
        ENV_LOG_LEVEL => "log_level",
        _ => "async_read_chunk",
    }
}

pub fn default_descriptor_names() -> Vec<String> {
    vec![
        "module.json".to_string(),
        "module.yaml".to_string(),
        "module.yml".to_string(),
    ]
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeConfigTrait for RuntimeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Ok(name) = env::var(ENV_CONTEXT_NAME) {
            config.context_name = name;
        }

        if let Some(paths) = env::var_os(ENV_MODULE_PATH) {
            config.module_paths = env::split_paths(&paths)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
        }

        if let Ok(names) = env::var(ENV_DESCRIPTOR_NAMES) {
            config.descriptor_names = names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(log_level) = env::var(ENV_LOG_LEVEL) {
            config.log_level = log_level.to_lowercase();
        }

        if let Ok(chunk) = env::var(ENV_ASSET_CHUNK) {
            config.async_read_chunk = chunk.parse().map_err(|_| {
                ConfigError::invalid_value("async_read_chunk", chunk.clone(), "a positive integer")
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.context_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "context_name".to_string(),
                hint: format!("set {} or leave it unset for \"root\"", ENV_CONTEXT_NAME),
            });
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid_value(
                "log_level",
                self.log_level.clone(),
                format!("one of: {}", LOG_LEVELS.join(", ")),
            ));
        }

        if self.async_read_chunk == 0 {
            return Err(ConfigError::invalid_value(
                "async_read_chunk",
                "0",
                "a positive integer",
            ));
        }

        if self.descriptor_names.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "descriptor_names".to_string(),
                hint: "at least one descriptor file name is needed to recognize modules".to_string(),
            });
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let source = |var: &str, default: &str| {
            if let Some(origin) = &self.origin {
                let field = field_for(var);
                return if origin.fields.iter().any(|name| name == field) {
                    ConfigSource::File(origin.path.display().to_string())
                } else {
                    ConfigSource::Default(default.to_string())
                };
            }
            if env::var_os(var).is_some() {
                ConfigSource::EnvVar(var.to_string())
            } else {
                ConfigSource::Default(default.to_string())
            }
        };

        let mut sources = HashMap::new();
        sources.insert("context_name".to_string(), source(ENV_CONTEXT_NAME, "root"));
        sources.insert("module_paths".to_string(), source(ENV_MODULE_PATH, "none"));
        sources.insert(
            "descriptor_names".to_string(),
            source(ENV_DESCRIPTOR_NAMES, "module.json, module.yaml, module.yml"),
        );
        sources.insert("log_level".to_string(), source(ENV_LOG_LEVEL, "info"));
        sources.insert("async_read_chunk".to_string(), source(ENV_ASSET_CHUNK, "8192"));
        sources
    }
}
