//! Settings file loading and commented generation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;
use url::Url;

use crate::api::ResolverConfig;
use crate::application::session::SessionSettings;
use crate::utils::FilenameRules;

pub const FILE_NAME: &str = "svd.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

const FIELDS: &[FieldMeta] = &[
    FieldMeta {
        name: "resolver_endpoint",
        description: "Resolver endpoint receiving POST {\"url\": ...}",
    },
    FieldMeta {
        name: "resolver_timeout_ms",
        description: "Resolver request timeout in milliseconds",
    },
    FieldMeta {
        name: "transfer_program",
        description: "curl-compatible executable used for the actual download",
    },
    FieldMeta {
        name: "filename_prefix",
        description: "Prefix of every saved file name (letters, digits, '_' and '-')",
    },
    FieldMeta {
        name: "filename_max_len",
        description: "Maximum length of a saved file name, extension included",
    },
    FieldMeta {
        name: "success_hold_ms",
        description: "How long the success message stays on screen before exit",
    },
    FieldMeta {
        name: "failure_hold_ms",
        description: "How long the failure message stays on screen before exit",
    },
    FieldMeta {
        name: "keep_partial",
        description: "Keep a partially downloaded file after a failed or cancelled download",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub resolver_endpoint: String,
    pub resolver_timeout_ms: u64,
    pub transfer_program: String,
    pub filename_prefix: String,
    pub filename_max_len: usize,
    pub success_hold_ms: u64,
    pub failure_hold_ms: u64,
    pub keep_partial: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let resolver = ResolverConfig::default();
        let rules = FilenameRules::default();
        Self {
            resolver_endpoint: resolver.endpoint,
            resolver_timeout_ms: resolver.timeout.as_millis() as u64,
            transfer_program: "curl".to_string(),
            filename_prefix: rules.prefix,
            filename_max_len: rules.max_len,
            success_hold_ms: 2000,
            failure_hold_ms: 5000,
            keep_partial: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = Url::parse(&self.resolver_endpoint).map_err(|e| {
            ConfigError::Validation(format!(
                "resolver_endpoint {:?}: {}",
                self.resolver_endpoint, e
            ))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "resolver_endpoint must be http(s), got {}",
                endpoint.scheme()
            )));
        }
        if self.resolver_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "resolver_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.transfer_program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "transfer_program must not be empty".to_string(),
            ));
        }
        if !self
            .filename_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::Validation(format!(
                "filename_prefix {:?} may only contain letters, digits, '_' and '-'",
                self.filename_prefix
            )));
        }
        Ok(())
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            endpoint: self.resolver_endpoint.clone(),
            timeout: Duration::from_millis(self.resolver_timeout_ms),
        }
    }

    pub fn session_settings(&self, working_dir: PathBuf) -> SessionSettings {
        SessionSettings {
            working_dir,
            filename_rules: FilenameRules {
                prefix: self.filename_prefix.clone(),
                max_len: self.filename_max_len,
            },
            success_hold: Duration::from_millis(self.success_hold_ms),
            failure_hold: Duration::from_millis(self.failure_hold_ms),
            keep_partial: self.keep_partial,
        }
    }
}

/// Load settings.
///
/// An explicit `path` must exist. Without one, `svd.yml` in the current
/// directory is used when present, otherwise the defaults.
pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default_path = PathBuf::from(FILE_NAME);
            if !default_path.exists() {
                return Ok(Settings::default());
            }
            default_path
        }
    };

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    parse(&raw, &path)
}

fn parse(raw: &str, path: &Path) -> Result<Settings, ConfigError> {
    let value: Value = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    // An empty file parses as null; treat it like an empty mapping.
    if value.is_null() {
        return Ok(Settings::default());
    }
    serde_yaml::from_value(value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_with_comments(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let yaml = generate_yaml_with_comments(settings)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn generate_yaml_with_comments(settings: &Settings) -> Result<String, ConfigError> {
    let value =
        serde_yaml::to_value(settings).map_err(|err| ConfigError::Validation(err.to_string()))?;
    let Value::Mapping(mapping) = value else {
        return Err(ConfigError::Validation(
            "settings must serialize to a mapping".to_string(),
        ));
    };

    let mut lines = Vec::new();
    for field in FIELDS {
        lines.push(format!("# {}", field.description));
        let key = Value::String(field.name.to_string());
        let val = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let yaml_line = serde_yaml::to_string(&serde_yaml::Mapping::from_iter([(key, val)]))
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        lines.push(yaml_line.trim().to_string());
    }
    lines.push(String::new());

    Ok(lines.join("\n"))
}
