//! Checkpoint loading for Candle-based classifiers

use crate::classifier::{ModelHandle, ModelLoader};
use crate::mobilenet::MobileNetV2;
use crate::model_config::{ArchitectureConfig, CheckpointFormat, CheckpointSource, ModelSchema};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use dermascan_core::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Tensor every MobileNetV2 checkpoint carries, used to find the name prefix
const STEM_WEIGHT: &str = "features.0.0.weight";

/// Keys a training program commonly nests its state dict under
const NESTED_KEYS: &[&str] = &["model", "state_dict", "model_state_dict"];

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// CPU inference (always available)
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize),
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl DeviceType {
    /// Parse `cpu`, `cuda`, `cuda:1`, `metal`, `metal:0`
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim().to_ascii_lowercase();
        let (kind, index) = match value.split_once(':') {
            Some((kind, index)) => {
                let index = index
                    .parse::<usize>()
                    .map_err(|_| Error::model_load(format!("invalid device index in '{}'", value)))?;
                (kind.to_string(), index)
            }
            None => (value.clone(), 0),
        };

        match kind.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda(index)),
            "metal" => Ok(Self::Metal(index)),
            other => Err(Error::model_load(format!("unknown device '{}'", other))),
        }
    }

    /// Create the Candle device
    pub fn create(self) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda(idx) => Device::new_cuda(idx)
                .map_err(|e| Error::model_load(format!("Failed to create CUDA device: {}", e))),
            Self::Metal(idx) => Device::new_metal(idx)
                .map_err(|e| Error::model_load(format!("Failed to create Metal device: {}", e))),
        }
    }
}

/// Loads a classifier described by a [`ModelSchema`]
#[derive(Debug, Clone)]
pub struct CandleModelLoader {
    schema: ModelSchema,
}

impl CandleModelLoader {
    /// Create a loader from a parsed schema
    pub fn new(schema: ModelSchema) -> Self {
        Self { schema }
    }

    /// Create a loader from a schema file
    pub fn from_schema_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ModelSchema::from_file(path)?))
    }

    /// Schema this loader builds from
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// Resolve, read, and build synchronously
    pub fn load_blocking(&self) -> Result<ModelHandle> {
        let start = Instant::now();
        let schema = &self.schema;

        let (num_classes, width_mult, head) = match &schema.architecture {
            ArchitectureConfig::MobilenetV2 {
                num_classes,
                width_mult,
                head,
            } => (*num_classes, *width_mult, head),
            ArchitectureConfig::Custom { implementation } => {
                return Err(Error::model_load(format!(
                    "custom architecture '{}' has no built-in implementation",
                    implementation
                )));
            }
        };

        let path = resolve_checkpoint_path(&schema.checkpoint.source)?;
        let device = DeviceType::parse(&schema.device)?.create()?;
        let format = schema.checkpoint.format.resolve(&path);

        let tensors = read_checkpoint(&path, format, schema.checkpoint.key.as_deref(), &device)?;
        let tensors = strip_prefix(tensors, schema.checkpoint.prefix.as_deref())?;
        debug!(tensors = tensors.len(), path = %path.display(), "Checkpoint read");

        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        let model = MobileNetV2::new(
            schema.name.clone(),
            vb,
            num_classes,
            width_mult,
            head,
            schema.input.size,
        )?;

        info!(
            model = %schema.name,
            num_classes,
            input_size = schema.input.size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Classifier loaded"
        );

        Ok(Arc::new(model))
    }
}

#[async_trait]
impl ModelLoader for CandleModelLoader {
    async fn load(&self) -> Result<ModelHandle> {
        let loader = self.clone();
        tokio::task::spawn_blocking(move || loader.load_blocking())
            .await
            .map_err(|e| Error::model_load(format!("model loading task failed: {}", e)))?
    }

    fn describe(&self) -> String {
        match &self.schema.checkpoint.source {
            CheckpointSource::Local { path } => {
                format!("{} from {}", self.schema.name, path.display())
            }
            CheckpointSource::HuggingFace {
                repo,
                revision,
                filename,
            } => format!("{} from hf://{}@{}/{}", self.schema.name, repo, revision, filename),
        }
    }
}

/// Resolve a checkpoint source to a local file
fn resolve_checkpoint_path(source: &CheckpointSource) -> Result<PathBuf> {
    match source {
        CheckpointSource::Local { path } => {
            if !path.exists() {
                return Err(Error::model_load(format!(
                    "checkpoint not found: {}",
                    path.display()
                )));
            }
            Ok(path.clone())
        }
        CheckpointSource::HuggingFace {
            repo,
            revision,
            filename,
        } => download_from_hub(repo, revision, filename),
    }
}

#[cfg(feature = "hf-hub-source")]
fn download_from_hub(repo: &str, revision: &str, filename: &str) -> Result<PathBuf> {
    use hf_hub::{api::sync::Api, Repo, RepoType};

    let api = Api::new()
        .map_err(|e| Error::model_load(format!("Failed to initialize HF API: {}", e)))?;
    let repo = api.repo(Repo::with_revision(
        repo.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    repo.get(filename)
        .map_err(|e| Error::model_load(format!("Failed to download checkpoint from HF: {}", e)))
}

#[cfg(not(feature = "hf-hub-source"))]
fn download_from_hub(repo: &str, _revision: &str, _filename: &str) -> Result<PathBuf> {
    Err(Error::model_load(format!(
        "checkpoint '{}' is on the HuggingFace Hub but this build has no hf-hub-source feature",
        repo
    )))
}

/// Read every tensor of a checkpoint into memory
fn read_checkpoint(
    path: &Path,
    format: CheckpointFormat,
    key: Option<&str>,
    device: &Device,
) -> Result<HashMap<String, Tensor>> {
    match format {
        CheckpointFormat::SafeTensors | CheckpointFormat::Auto => {
            candle_core::safetensors::load(path, device)
                .map_err(|e| Error::model_load(format!("Failed to load SafeTensors: {}", e)))
        }
        CheckpointFormat::PyTorch => read_pytorch(path, key),
    }
}

/// Read a pickled state dict, trying the configured key or the common ones
fn read_pytorch(path: &Path, key: Option<&str>) -> Result<HashMap<String, Tensor>> {
    let candidates: Vec<Option<&str>> = match key {
        Some(key) => vec![Some(key)],
        None => std::iter::once(None)
            .chain(NESTED_KEYS.iter().map(|k| Some(*k)))
            .collect(),
    };

    let mut last_error = None;
    for candidate in candidates {
        match candle_core::pickle::read_all_with_key(path, candidate) {
            Ok(tensors) if !tensors.is_empty() => {
                debug!(key = ?candidate, "Found state dict in PyTorch checkpoint");
                return Ok(tensors.into_iter().collect());
            }
            Ok(_) => continue,
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(Error::model_load(format!(
        "no state dict found in {} (expected a state dict, optionally under one of: {}){}",
        path.display(),
        key.map(|k| vec![k]).unwrap_or_else(|| NESTED_KEYS.to_vec()).join(", "),
        last_error.map(|e| format!(": {}", e)).unwrap_or_default()
    )))
}

/// Remove the exporting program's tensor-name prefix.
///
/// With no explicit prefix, it is whatever precedes the stem convolution's
/// weight name.
fn strip_prefix(
    tensors: HashMap<String, Tensor>,
    prefix: Option<&str>,
) -> Result<HashMap<String, Tensor>> {
    let prefix = match prefix {
        Some(p) => p.to_string(),
        None => detect_prefix(tensors.keys().map(String::as_str)).ok_or_else(|| {
            Error::model_load(format!(
                "checkpoint has no '{}' tensor; is it a MobileNetV2 state dict?",
                STEM_WEIGHT
            ))
        })?,
    };

    if prefix.is_empty() {
        return Ok(tensors);
    }

    Ok(tensors
        .into_iter()
        .filter_map(|(name, tensor)| {
            name.strip_prefix(&prefix)
                .map(|stripped| (stripped.to_string(), tensor))
        })
        .collect())
}

fn detect_prefix<'a>(mut names: impl Iterator<Item = &'a str>) -> Option<String> {
    names.find_map(|name| name.strip_suffix(STEM_WEIGHT).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parse() {
        assert_eq!(DeviceType::parse("cpu").unwrap(), DeviceType::Cpu);
        assert_eq!(DeviceType::parse("CUDA:1").unwrap(), DeviceType::Cuda(1));
        assert_eq!(DeviceType::parse("metal").unwrap(), DeviceType::Metal(0));
        assert!(DeviceType::parse("tpu").is_err());
        assert!(DeviceType::parse("cuda:x").is_err());
    }

    #[test]
    fn test_detect_prefix() {
        let names = ["model.features.0.0.weight", "model.classifier.1.weight"];
        assert_eq!(detect_prefix(names.into_iter()).as_deref(), Some("model."));

        let names = ["features.0.0.weight"];
        assert_eq!(detect_prefix(names.into_iter()).as_deref(), Some(""));

        let names = ["encoder.layer.0.weight"];
        assert!(detect_prefix(names.into_iter()).is_none());
    }

    #[test]
    fn test_strip_prefix_drops_foreign_tensors() {
        let t = Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap();
        let mut tensors = HashMap::new();
        tensors.insert("model.features.0.0.weight".to_string(), t.clone());
        tensors.insert("optimizer.step".to_string(), t);

        let stripped = strip_prefix(tensors, None).unwrap();
        assert_eq!(stripped.len(), 1);
        assert!(stripped.contains_key("features.0.0.weight"));
    }

    #[test]
    fn test_missing_local_checkpoint() {
        let source = CheckpointSource::Local {
            path: PathBuf::from("/nonexistent/checkpoint.pt"),
        };
        let err = resolve_checkpoint_path(&source).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }
}
