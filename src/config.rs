//! Configuration management for PDF Drop

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::upload::{DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_MAX_UPLOAD_BYTES};

/// Default artifact retention: 30 seconds
pub const DEFAULT_RETENTION_SECS: u64 = 30;

/// Longest accepted retention: one day
pub const MAX_RETENTION_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the local backend
    pub dir: PathBuf,
    /// How long an artifact stays retrievable
    pub retention: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub allowed_content_types: Vec<String>,
    pub max_upload_bytes: usize,
    /// Where upload parts are spooled; system temp dir when unset
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 4000,
            },
            storage: StorageConfig {
                backend: StorageBackend::Local,
                dir: PathBuf::from("./public/pdfs"),
                retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            },
            upload: UploadConfig {
                allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                temp_dir: None,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source, falling back to defaults for unset
    /// variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let retention_secs: u64 = parse_var(&lookup, "RETENTION_SECS", DEFAULT_RETENTION_SECS)?;
        if retention_secs == 0 || retention_secs > MAX_RETENTION_SECS {
            return Err(invalid("RETENTION_SECS", retention_secs.to_string()));
        }

        let max_upload_bytes: usize =
            parse_var(&lookup, "MAX_UPLOAD_BYTES", defaults.upload.max_upload_bytes)?;
        if max_upload_bytes == 0 {
            return Err(invalid("MAX_UPLOAD_BYTES", "0".to_string()));
        }

        let backend = match lookup("ARTIFACT_BACKEND") {
            None => defaults.storage.backend,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "local" => StorageBackend::Local,
                "memory" => StorageBackend::Memory,
                _ => return Err(invalid("ARTIFACT_BACKEND", value)),
            },
        };

        let allowed_content_types = match lookup("ALLOWED_CONTENT_TYPES") {
            None => defaults.upload.allowed_content_types,
            Some(value) => {
                let types: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if types.is_empty() {
                    return Err(invalid("ALLOWED_CONTENT_TYPES", value));
                }
                types
            }
        };

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var(&lookup, "SERVER_PORT", defaults.server.port)?,
            },
            storage: StorageConfig {
                backend,
                dir: lookup("ARTIFACT_DIR")
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.dir),
                retention: Duration::from_secs(retention_secs),
            },
            upload: UploadConfig {
                allowed_content_types,
                max_upload_bytes,
                temp_dir: lookup("UPLOAD_TEMP_DIR")
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from),
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| invalid(name, value)),
    }
}

fn invalid(name: &'static str, value: String) -> ConfigError {
    ConfigError::Invalid { name, value }
}
