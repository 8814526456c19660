//! Prediction engine: forward pass, softmax, ranking, label mapping

use crate::classifier::ImageClassifier;
use candle_core::{Tensor, D};
use dermascan_core::{Error, LabelCatalog, LabelScore, Result};
use std::time::Instant;
use tracing::debug;

/// One ranked class
#[derive(Debug, Clone, PartialEq)]
pub struct RankedLabel {
    /// Classifier output index
    pub index: usize,

    /// Catalog short code
    pub code: String,

    /// Catalog descriptive name
    pub label: String,

    /// Softmax confidence (0.0-1.0)
    pub confidence: f32,
}

impl From<&RankedLabel> for LabelScore {
    fn from(ranked: &RankedLabel) -> Self {
        LabelScore::new(ranked.label.clone(), ranked.confidence)
    }
}

/// Ranked output of a single inference
#[derive(Debug, Clone)]
pub struct RankedResults {
    /// Classes by descending confidence, truncated to `top_k`
    pub ranked: Vec<RankedLabel>,

    /// Forward pass latency in microseconds
    pub latency_us: u64,
}

impl RankedResults {
    /// Arg-max class
    pub fn top(&self) -> Option<&RankedLabel> {
        self.ranked.first()
    }

    /// Convert to persisted (label, confidence) pairs
    pub fn label_scores(&self) -> Vec<LabelScore> {
        self.ranked.iter().map(LabelScore::from).collect()
    }
}

/// Maps classifier outputs through the label catalog
#[derive(Debug, Clone)]
pub struct PredictionEngine {
    catalog: LabelCatalog,
    top_k: usize,
}

impl PredictionEngine {
    /// Create an engine for a classifier with `output_width` classes.
    ///
    /// Fails when the catalog width differs from the classifier's.
    pub fn new(catalog: LabelCatalog, output_width: usize, top_k: usize) -> Result<Self> {
        catalog.ensure_width(output_width)?;
        Ok(Self {
            catalog,
            top_k: top_k.clamp(1, output_width),
        })
    }

    /// Create an engine sized for a loaded classifier
    pub fn for_model(catalog: LabelCatalog, model: &dyn ImageClassifier, top_k: usize) -> Result<Self> {
        Self::new(catalog, model.output_width(), top_k)
    }

    /// Label catalog in use
    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    /// Number of ranked entries returned per prediction
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Run a single-image forward pass and rank the results
    pub fn predict(&self, input: &Tensor, model: &dyn ImageClassifier) -> Result<RankedResults> {
        let size = model.input_size();
        let expected = [1, 3, size, size];
        if input.dims() != expected {
            return Err(Error::inference(format!(
                "input tensor shape {:?} does not match expected {:?}",
                input.dims(),
                expected
            )));
        }

        let start = Instant::now();
        let logits = model.forward(input)?;
        let latency_us = start.elapsed().as_micros() as u64;

        let probs = to_probabilities(&logits)?;
        if probs.len() != self.catalog.len() {
            return Err(Error::inference(format!(
                "classifier produced {} outputs but the label catalog has {}",
                probs.len(),
                self.catalog.len()
            )));
        }

        let ranked = self.rank(&probs)?;
        if let Some(top) = ranked.first() {
            debug!(
                model = model.name(),
                label = %top.code,
                confidence = top.confidence,
                latency_us,
                "Inference complete"
            );
        }

        Ok(RankedResults { ranked, latency_us })
    }

    /// Order class probabilities best-first and attach catalog labels
    pub fn rank(&self, probs: &[f32]) -> Result<Vec<RankedLabel>> {
        let mut order: Vec<usize> = (0..probs.len()).collect();
        // Stable sort keeps the lower index first on ties, like arg-max
        order.sort_by(|&a, &b| {
            probs[b]
                .partial_cmp(&probs[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        order
            .into_iter()
            .take(self.top_k)
            .map(|index| {
                let entry = self.catalog.get(index).ok_or_else(|| {
                    Error::inference(format!("output index {} has no catalog entry", index))
                })?;
                Ok(RankedLabel {
                    index,
                    code: entry.code.clone(),
                    label: entry.name.clone(),
                    confidence: probs[index],
                })
            })
            .collect()
    }
}

/// Softmax over the class dimension of a `1 x K` logit tensor
fn to_probabilities(logits: &Tensor) -> Result<Vec<f32>> {
    let dims = logits.dims();
    if dims.len() != 2 || dims[0] != 1 {
        return Err(Error::inference(format!(
            "expected 1 x K classifier output, got {:?}",
            dims
        )));
    }

    candle_nn::ops::softmax(logits, D::Minus1)
        .and_then(|p| p.squeeze(0))
        .and_then(|p| p.to_dtype(candle_core::DType::F32))
        .and_then(|p| p.to_vec1::<f32>())
        .map_err(|e| Error::inference(format!("softmax failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_orders_by_confidence() {
        let engine = PredictionEngine::new(LabelCatalog::ham10000(), 7, 3).unwrap();
        let probs = [0.01, 0.02, 0.05, 0.01, 0.8, 0.01, 0.1];
        let ranked = engine.rank(&probs).unwrap();

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].code, "nv");
        assert_eq!(ranked[1].code, "mel");
        assert_eq!(ranked[2].code, "bkl");
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let engine = PredictionEngine::new(LabelCatalog::ham10000(), 7, 1).unwrap();
        let probs = [0.1, 0.3, 0.3, 0.1, 0.1, 0.05, 0.05];
        assert_eq!(engine.rank(&probs).unwrap()[0].index, 1);
    }

    #[test]
    fn test_top_k_clamped() {
        let engine = PredictionEngine::new(LabelCatalog::ham10000(), 7, 50).unwrap();
        assert_eq!(engine.top_k(), 7);
        let engine = PredictionEngine::new(LabelCatalog::ham10000(), 7, 0).unwrap();
        assert_eq!(engine.top_k(), 1);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        assert!(PredictionEngine::new(LabelCatalog::ham10000(), 6, 1).is_err());
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let logits = Tensor::new(&[[1f32, 2.0, 3.0]], &candle_core::Device::Cpu).unwrap();
        let probs = to_probabilities(&logits).unwrap();
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_rejects_batched_output() {
        let logits = Tensor::zeros((2, 7), candle_core::DType::F32, &candle_core::Device::Cpu).unwrap();
        assert!(matches!(to_probabilities(&logits), Err(Error::Inference(_))));
    }
}
