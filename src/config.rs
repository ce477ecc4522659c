//! Configuration management for upprobe
//!
//! This module handles configuration loading and validation.

use crate::error::{Result, UploadError};
use crate::payload::{PayloadGenerator, DEFAULT_PAYLOAD_SIZE_MB};
use crate::request::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use url::Url;

/// Default echo endpoint uploads are posted to
pub const DEFAULT_ENDPOINT: &str = "https://httpbin.org/post";

/// Largest accepted body slice (16 MiB)
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Configuration for a single upload attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Payload size in MiB; fractional sizes truncate to whole bytes
    pub payload_size_mb: f64,

    /// Seed for reproducible payload contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_seed: Option<u64>,

    /// Body slice size in bytes; one progress event is emitted per slice
    pub chunk_size: usize,

    /// Verbose output - log every progress sample
    pub verbose: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            payload_size_mb: DEFAULT_PAYLOAD_SIZE_MB,
            payload_seed: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            verbose: false,
        }
    }
}

impl UploadConfig {
    /// Create a new upload config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set payload size in MiB
    pub fn with_payload_size_mb(mut self, size_mb: f64) -> Self {
        self.payload_size_mb = size_mb;
        self
    }

    /// Set payload seed
    pub fn with_payload_seed(mut self, seed: u64) -> Self {
        self.payload_seed = Some(seed);
        self
    }

    /// Set body slice size
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Generator producing payloads for these settings
    pub fn payload_generator(&self) -> PayloadGenerator {
        let generator = PayloadGenerator::new(self.payload_size_mb);
        match self.payload_seed {
            Some(seed) => generator.with_seed(seed),
            None => generator,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.payload_size_mb.is_finite() || self.payload_size_mb <= 0.0 {
            return Err(UploadError::Config(format!(
                "Payload size must be a positive number of MiB, got {}",
                self.payload_size_mb
            )));
        }

        if self.chunk_size == 0 {
            return Err(UploadError::Config("Chunk size cannot be zero".into()));
        }

        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(UploadError::Config(
                "Chunk size too large (max 16MB)".into(),
            ));
        }

        Ok(())
    }
}

/// Global application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Absolute URL uploads are posted to
    pub endpoint: String,

    /// Upload configuration defaults
    pub upload: UploadConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            upload: UploadConfig::default(),
        }
    }
}

impl AppConfig {
    /// Directory holding the config file
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .map(|p| p.join(".upprobe"))
            .unwrap_or_else(|| PathBuf::from(".upprobe"))
    }

    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`
    ///
    /// A missing file yields the defaults; keys absent from the file keep their
    /// default values.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(config_error("read", path, e)),
        };

        toml::from_str(&contents).map_err(|e| config_error("parse", path, e))
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`, creating parent directories as needed.
    ///
    /// The file is written next to its destination and renamed into place, so a
    /// reader never sees a half-written config.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let rendered = toml::to_string_pretty(self).map_err(|e| config_error("serialize", path, e))?;

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| config_error("create directory for", path, e))?;
        }

        let staged = path.with_extension("toml.partial");
        let written = fs::File::create(&staged).and_then(|mut file| {
            file.write_all(rendered.as_bytes())?;
            file.sync_all()
        });

        if let Err(e) = written.and_then(|()| fs::rename(&staged, path)) {
            let _ = fs::remove_file(&staged);
            return Err(config_error("write", path, e));
        }

        tracing::debug!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Parsed upload endpoint
    pub fn endpoint_url(&self) -> Result<Url> {
        parse_endpoint(&self.endpoint)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.endpoint_url()?;
        self.upload.validate()
    }

    /// Get a config value by key path (e.g., "upload.chunk_size")
    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["endpoint"] => Ok(self.endpoint.clone()),
            ["upload", "payload_size_mb"] => Ok(self.upload.payload_size_mb.to_string()),
            ["upload", "payload_seed"] => Ok(self
                .upload
                .payload_seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())),
            ["upload", "chunk_size"] => Ok(self.upload.chunk_size.to_string()),
            ["upload", "verbose"] => Ok(self.upload.verbose.to_string()),
            _ => Err(UploadError::Config(format!("Unknown config key: {}", key))),
        }
    }

    /// Set a config value by key path (e.g., "upload.chunk_size")
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["endpoint"] => {
                parse_endpoint(value)?;
                self.endpoint = value.to_string();
            }
            ["upload", "payload_size_mb"] => {
                self.upload.payload_size_mb = value.parse().map_err(|_| {
                    UploadError::Config(format!("Invalid payload size: {}", value))
                })?;
            }
            ["upload", "payload_seed"] => {
                self.upload.payload_seed = match value.to_lowercase().as_str() {
                    "none" | "" => None,
                    seed => Some(seed.parse().map_err(|_| {
                        UploadError::Config(format!("Invalid payload seed: {}", value))
                    })?),
                };
            }
            ["upload", "chunk_size"] => {
                self.upload.chunk_size = value.parse().map_err(|_| {
                    UploadError::Config(format!("Invalid chunk size: {}", value))
                })?;
            }
            ["upload", "verbose"] => {
                self.upload.verbose = value.parse().map_err(|_| {
                    UploadError::Config(format!("Invalid boolean: {}", value))
                })?;
            }
            _ => {
                return Err(UploadError::Config(format!(
                    "Unknown config key: {}",
                    key
                )))
            }
        }

        // Validate after setting
        self.upload.validate()?;

        Ok(())
    }
}

fn config_error(action: &str, path: &Path, err: impl std::fmt::Display) -> UploadError {
    UploadError::Config(format!("Failed to {} config file {}: {}", action, path.display(), err))
}

/// Parse an absolute http(s) endpoint URL
pub fn parse_endpoint(value: &str) -> Result<Url> {
    let url = Url::parse(value).map_err(|e| UploadError::InvalidUrl(format!("{}: {}", value, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UploadError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            value, scheme
        ))),
    }
}
