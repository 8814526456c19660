//! Versioned model schema
//!
//! The schema is the compatibility contract between the program that exported
//! a checkpoint and this service. It names the architecture, its input
//! geometry, and where the weights live inside the checkpoint (nested key and
//! tensor-name prefix), so loading never depends on how the exporting program
//! named its classes.

use dermascan_core::{ClassLabel, Error, LabelCatalog, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema versions this build understands
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &["1"];

/// Top-level model schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSchema {
    /// Schema format version
    pub version: String,

    /// Model name
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Model description
    #[serde(default)]
    pub description: String,

    /// Network architecture
    pub architecture: ArchitectureConfig,

    /// Input geometry and normalization
    #[serde(default)]
    pub input: InputConfig,

    /// Where and how to read the weights
    pub checkpoint: CheckpointConfig,

    /// Device to run on (cpu, cuda, metal)
    #[serde(default = "default_device")]
    pub device: String,

    /// Catalog override; defaults to the HAM10000 ordering
    #[serde(default)]
    pub labels: Option<Vec<ClassLabel>>,
}

fn default_model_name() -> String {
    "lesion-classifier".to_string()
}

fn default_device() -> String {
    "cpu".to_string()
}

/// Network architecture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ArchitectureConfig {
    /// MobileNetV2 backbone with a configurable classification head
    MobilenetV2 {
        num_classes: usize,
        #[serde(default = "default_width_mult")]
        width_mult: f64,
        #[serde(default)]
        head: HeadConfig,
    },

    /// Custom architecture (requires code implementation)
    Custom { implementation: String },
}

fn default_width_mult() -> f64 {
    1.0
}

impl ArchitectureConfig {
    /// Output width of the network
    pub fn num_classes(&self) -> Option<usize> {
        match self {
            Self::MobilenetV2 { num_classes, .. } => Some(*num_classes),
            Self::Custom { .. } => None,
        }
    }
}

/// Classification head layout.
///
/// Layers are laid out the way a `Sequential` container numbers them, so the
/// tensor names are `classifier.<index>.*`. The default is the head the
/// lesion checkpoint was trained with: dropout, then
/// `[Linear(no bias), ReLU, BatchNorm]` per hidden width, then a final
/// `Linear(no bias)` followed by `BatchNorm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadConfig {
    /// Hidden layer widths
    #[serde(default = "default_hidden")]
    pub hidden: Vec<usize>,

    /// Leading dropout layer (occupies an index, inactive at inference)
    #[serde(default = "default_true")]
    pub dropout: bool,

    /// Linear layers carry a bias
    #[serde(default)]
    pub bias: bool,

    /// BatchNorm after each hidden ReLU
    #[serde(default = "default_true")]
    pub batch_norm: bool,

    /// BatchNorm after the output layer
    #[serde(default = "default_true")]
    pub output_batch_norm: bool,
}

fn default_hidden() -> Vec<usize> {
    vec![256, 128]
}

fn default_true() -> bool {
    true
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            hidden: default_hidden(),
            dropout: true,
            bias: false,
            batch_norm: true,
            output_batch_norm: true,
        }
    }
}

impl HeadConfig {
    /// Stock torchvision head: dropout then a single biased linear layer
    pub fn torchvision() -> Self {
        Self {
            hidden: Vec::new(),
            dropout: true,
            bias: true,
            batch_norm: false,
            output_batch_norm: false,
        }
    }
}

/// Input geometry and normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Square input resolution
    #[serde(default = "default_input_size")]
    pub size: usize,

    /// Per-channel mean subtracted after scaling to [0, 1]
    #[serde(default)]
    pub mean: Option<[f32; 3]>,

    /// Per-channel standard deviation divided after mean subtraction
    #[serde(default)]
    pub std: Option<[f32; 3]>,
}

fn default_input_size() -> usize {
    224
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            size: default_input_size(),
            mean: None,
            std: None,
        }
    }
}

/// Checkpoint location and layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Where the checkpoint file lives
    pub source: CheckpointSource,

    /// File format; `auto` decides by extension
    #[serde(default)]
    pub format: CheckpointFormat,

    /// Key the state dict is nested under in a PyTorch checkpoint.
    /// When absent the top level is tried first, then `model`, `state_dict`
    /// and `model_state_dict`.
    #[serde(default)]
    pub key: Option<String>,

    /// Tensor-name prefix added by the exporting program (e.g. `model.`).
    /// When absent it is detected from the stem convolution's name.
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Checkpoint source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Load from local filesystem
    Local { path: PathBuf },

    /// Download from HuggingFace Hub
    HuggingFace {
        repo: String,
        #[serde(default = "default_revision")]
        revision: String,
        filename: String,
    },
}

fn default_revision() -> String {
    "main".to_string()
}

/// Checkpoint file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointFormat {
    /// Decide by extension (`.safetensors` vs `.pt`/`.pth`/`.bin`)
    #[default]
    Auto,
    /// SafeTensors format (recommended)
    SafeTensors,
    /// PyTorch pickle state dict
    PyTorch,
}

impl CheckpointFormat {
    /// Resolve `Auto` against a concrete path
    pub fn resolve(self, path: &Path) -> CheckpointFormat {
        match self {
            Self::Auto => match path.extension().and_then(|e| e.to_str()) {
                Some("safetensors") => Self::SafeTensors,
                _ => Self::PyTorch,
            },
            other => other,
        }
    }
}

impl ModelSchema {
    /// Load a schema from a YAML file. Relative local checkpoint paths are
    /// resolved against the schema file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::model_load(format!("failed to read model schema {}: {}", path.display(), e))
        })?;
        let mut schema = Self::from_yaml(&contents)?;

        if let CheckpointSource::Local { path: ckpt } = &mut schema.checkpoint.source {
            if ckpt.is_relative() {
                if let Some(dir) = path.parent() {
                    *ckpt = dir.join(&*ckpt);
                }
            }
        }

        Ok(schema)
    }

    /// Parse and validate a schema from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let schema: ModelSchema = serde_yaml::from_str(contents)
            .map_err(|e| Error::model_load(format!("failed to parse model schema: {}", e)))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check version and internal consistency
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_SCHEMA_VERSIONS.contains(&self.version.as_str()) {
            return Err(Error::model_load(format!(
                "unsupported model schema version '{}' (supported: {})",
                self.version,
                SUPPORTED_SCHEMA_VERSIONS.join(", ")
            )));
        }

        if self.input.size < 32 {
            return Err(Error::model_load(format!(
                "input size {} is too small for a stride-32 backbone",
                self.input.size
            )));
        }

        if let Some(std) = self.input.std {
            if std.iter().any(|s| *s <= 0.0) {
                return Err(Error::model_load("input std must be positive"));
            }
        }

        if let Some(num_classes) = self.architecture.num_classes() {
            self.catalog()?.ensure_width(num_classes).map_err(|e| {
                Error::model_load(format!("schema '{}': {}", self.name, e))
            })?;
        }

        Ok(())
    }

    /// Label catalog for this model
    pub fn catalog(&self) -> Result<LabelCatalog> {
        match &self.labels {
            Some(labels) => LabelCatalog::new(labels.clone()),
            None => Ok(LabelCatalog::ham10000()),
        }
    }
}
