//! Mock classifiers and loaders for testing
//!
//! Provides configurable implementations of the `ImageClassifier` and
//! `ModelLoader` traits for exercising the provider and engine without a
//! real checkpoint.

use async_trait::async_trait;
use candle_core::{Device, Tensor};
use dermascan_classifier::{ImageClassifier, ModelHandle, ModelLoader, ModelProvider, ModelStatus, PredictionEngine};
use dermascan_core::{Error, LabelCatalog, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A classifier that always favors one class with a fixed probability
pub struct StubClassifier {
    name: String,
    class: usize,
    confidence: f32,
    width: usize,
    input_size: usize,
}

impl StubClassifier {
    /// Create a stub over `width` classes that picks `class`
    pub fn new(class: usize, confidence: f32) -> Self {
        Self {
            name: "stub".to_string(),
            class,
            confidence,
            width: 7,
            input_size: 224,
        }
    }

    /// Set the number of output classes
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Set the expected input resolution
    pub fn with_input_size(mut self, size: usize) -> Self {
        self.input_size = size;
        self
    }
}

impl ImageClassifier for StubClassifier {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let batch = input.dims()[0];
        let rest = (1.0 - self.confidence) / (self.width - 1) as f32;

        // Log-probabilities: softmax maps them back to the probabilities
        let row: Vec<f32> = (0..self.width)
            .map(|i| if i == self.class { self.confidence } else { rest })
            .map(f32::ln)
            .collect();
        let data: Vec<f32> = row.iter().copied().cycle().take(batch * self.width).collect();

        Tensor::from_vec(data, (batch, self.width), &Device::Cpu)
            .map_err(|e| Error::inference(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_width(&self) -> usize {
        self.width
    }
}

/// A loader that counts how often it is invoked
pub struct CountingLoader {
    calls: AtomicU32,
    delay: Duration,
    fail_with: Option<String>,
}

impl CountingLoader {
    /// Create a loader that succeeds after `delay`
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay,
            fail_with: None,
        }
    }

    /// Make every load fail with `message`
    pub fn failing(message: &str) -> Self {
        Self {
            calls: AtomicU32::new(0),
            delay: Duration::from_millis(5),
            fail_with: Some(message.to_string()),
        }
    }

    /// Number of load calls so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for CountingLoader {
    async fn load(&self) -> Result<ModelHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        match &self.fail_with {
            Some(message) => Err(Error::model_load(message.clone())),
            None => Ok(Arc::new(StubClassifier::new(4, 0.91))),
        }
    }

    fn describe(&self) -> String {
        "counting-stub".to_string()
    }
}

fn input(size: usize) -> Tensor {
    Tensor::zeros((1, 3, size, size), candle_core::DType::F32, &Device::Cpu).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_one_load() {
        let loader = Arc::new(CountingLoader::new(Duration::from_millis(50)));
        let provider = Arc::new(ModelProvider::new(loader.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.get_model().await.unwrap() })
            })
            .collect();

        let models: Vec<ModelHandle> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(loader.calls(), 1);
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(provider.status(), ModelStatus::Ready);
    }

    #[tokio::test]
    async fn test_status_loading_before_first_use() {
        let loader = Arc::new(CountingLoader::new(Duration::ZERO));
        let provider = ModelProvider::new(loader.clone());

        assert_eq!(provider.status(), ModelStatus::Loading);
        assert_eq!(loader.calls(), 0);

        assert_eq!(provider.preload().await, ModelStatus::Ready);
        provider.get_model().await.unwrap();
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_cached() {
        let loader = Arc::new(CountingLoader::failing("checkpoint not found: /models/x.pt"));
        let provider = ModelProvider::new(loader.clone());

        let status = provider.preload().await;
        assert!(matches!(status, ModelStatus::Degraded(ref m) if m.contains("checkpoint not found")));

        for _ in 0..3 {
            let err = provider.get_model().await.err().unwrap();
            assert!(matches!(err, Error::ModelLoad(_)));
        }
        assert_eq!(loader.calls(), 1);
    }

    #[test]
    fn test_stub_prediction_maps_to_nevus() {
        let engine = PredictionEngine::new(LabelCatalog::ham10000(), 7, 3).unwrap();
        let model = StubClassifier::new(4, 0.91);

        let results = engine.predict(&input(224), &model).unwrap();
        let top = results.top().unwrap();

        assert_eq!(top.index, 4);
        assert_eq!(top.code, "nv");
        assert_eq!(top.label, "Melanocytic nevi (Melanositik nevüs)");
        assert!((top.confidence - 0.91).abs() < 1e-4);
        assert_eq!(results.ranked.len(), 3);
        assert!(results.ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn test_engine_rejects_wrong_input_shape() {
        let engine = PredictionEngine::new(LabelCatalog::ham10000(), 7, 1).unwrap();
        let model = StubClassifier::new(0, 0.5);

        let err = engine.predict(&input(64), &model).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_engine_rejects_width_drift() {
        // Engine sized for 7 classes, classifier suddenly emits 5
        let engine = PredictionEngine::new(LabelCatalog::ham10000(), 7, 1).unwrap();
        let model = StubClassifier::new(0, 0.5).with_width(5).with_input_size(32);

        let err = engine.predict(&input(32), &model).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[test]
    fn test_engine_for_model_checks_width() {
        let model = StubClassifier::new(0, 0.9).with_width(3);
        assert!(PredictionEngine::for_model(LabelCatalog::ham10000(), &model, 1).is_err());
    }
}
