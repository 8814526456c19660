//! Server configuration
//!
//! Layered in order: built-in defaults, the YAML file (optional), environment
//! variables prefixed `DERMASCAN__` with `__` between path segments
//! (`DERMASCAN__SERVER__PORT=9000`), then command-line overrides.

use crate::cli::Cli;
use anyhow::Context;
use ::config::{Config, Environment, File, FileFormat};
use dermascan_store::MAX_PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener settings
    pub server: ListenConfig,

    /// Classifier settings
    pub model: ModelConfig,

    /// Prediction store settings
    pub store: StoreConfig,

    /// Upload handling
    pub upload: UploadConfig,

    /// History pagination
    pub pagination: PaginationConfig,

    /// Log output
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Listen address
    pub listen: String,

    /// Listen port
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model schema file
    pub schema: PathBuf,

    /// Ranked classes returned per prediction
    pub top_k: usize,

    /// Load the classifier at startup instead of on first request
    pub preload: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            schema: PathBuf::from("./models/ham10000-mobilenet-v2.yaml"),
            top_k: 3,
            preload: true,
        }
    }
}

/// Prediction store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON-lines file in the data directory
    #[default]
    Jsonl,
    /// Process memory (lost on restart)
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend
    pub backend: StoreBackend,

    /// Data directory for the JSON-lines store
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Jsonl,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted upload in bytes
    pub max_bytes: usize,

    /// Keep a copy of every upload here, under its sanitized filename
    pub archive_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024 * 1024,
            archive_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size when `limit` is omitted
    pub default_limit: usize,

    /// Largest page size; never above the store cap
    pub max_limit: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: MAX_PAGE_SIZE,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from file, environment, and CLI overrides
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(
                File::from(cli.config.as_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("DERMASCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read configuration {}", cli.config.display()))?;

        let mut config: ServerConfig = settings
            .try_deserialize()
            .context("invalid configuration")?;

        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text (no environment layering)
    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let config: ServerConfig = parse_yaml(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(schema) = &cli.model_schema {
            self.model.schema = schema.clone();
        }
        if let Some(backend) = cli.store {
            self.store.backend = backend;
        }
        if let Some(dir) = &cli.data_dir {
            self.store.data_dir = dir.clone();
        }
        if let Some(format) = cli.log_format {
            self.logging.format = format;
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.model.top_k >= 1, "model.top_k must be at least 1");
        anyhow::ensure!(self.upload.max_bytes > 0, "upload.max_bytes must be positive");
        anyhow::ensure!(
            (1..=MAX_PAGE_SIZE).contains(&self.pagination.max_limit),
            "pagination.max_limit must be between 1 and {}",
            MAX_PAGE_SIZE
        );
        anyhow::ensure!(
            self.pagination.default_limit >= 1
                && self.pagination.default_limit <= self.pagination.max_limit,
            "pagination.default_limit must be between 1 and pagination.max_limit"
        );
        Ok(())
    }
}

fn parse_yaml(contents: &str) -> anyhow::Result<ServerConfig> {
    Config::builder()
        .add_source(File::from_str(contents, FileFormat::Yaml))
        .build()
        .and_then(|c| c.try_deserialize())
        .context("invalid configuration")
}
