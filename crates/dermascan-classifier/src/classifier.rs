//! Classifier and loader traits

use async_trait::async_trait;
use candle_core::Tensor;
use dermascan_core::Result;
use std::sync::Arc;

/// Shared, immutable handle to a loaded classifier
pub type ModelHandle = Arc<dyn ImageClassifier>;

/// A frozen image classifier.
///
/// Implementations hold no mutable state: weights are plain tensors and every
/// layer runs in inference mode, so a handle can be shared across requests.
pub trait ImageClassifier: Send + Sync {
    /// Run a forward pass over a `N x 3 x S x S` batch, returning raw
    /// `N x K` scores (logits)
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Square input resolution `S` the classifier expects
    fn input_size(&self) -> usize;

    /// Number of output classes `K`
    fn output_width(&self) -> usize;
}

/// Source of the process-wide classifier.
///
/// The model provider calls `load` at most once per process.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the classifier
    async fn load(&self) -> Result<ModelHandle>;

    /// Human-readable description of what is being loaded (for logs)
    fn describe(&self) -> String;
}
