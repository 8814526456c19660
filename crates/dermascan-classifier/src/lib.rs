//! DermaScan Classifier
//!
//! Skin-lesion image classification on Candle.
//!
//! - [`model_config`]: versioned model schema (architecture, input, checkpoint layout)
//! - [`model_loader`]: checkpoint reading and network construction
//! - [`provider`]: at-most-once, process-wide model loading
//! - [`preprocess`]: upload bytes to a normalized input tensor
//! - [`engine`]: forward pass, softmax, ranking, label mapping
//!
//! Everything runs on CPU by default; the schema may select CUDA or Metal.

pub mod classifier;
pub mod engine;
pub mod mobilenet;
pub mod model_config;
pub mod model_loader;
pub mod preprocess;
pub mod provider;

pub use classifier::{ImageClassifier, ModelHandle, ModelLoader};
pub use engine::{PredictionEngine, RankedLabel, RankedResults};
pub use mobilenet::MobileNetV2;
pub use model_config::{
    ArchitectureConfig, CheckpointConfig, CheckpointFormat, CheckpointSource, HeadConfig,
    InputConfig, ModelSchema,
};
pub use model_loader::{CandleModelLoader, DeviceType};
pub use preprocess::{sniff_format, ImagePreprocessor};
pub use provider::{ModelProvider, ModelStatus};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{ImageClassifier, ModelHandle, ModelLoader};
    pub use crate::engine::PredictionEngine;
    pub use crate::model_loader::CandleModelLoader;
    pub use crate::preprocess::ImagePreprocessor;
    pub use crate::provider::ModelProvider;
}
