//! Core types for DermaScan

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single (label, confidence) pair produced by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    /// Human-readable class name from the label catalog
    pub label: String,

    /// Softmax confidence (0.0-1.0)
    pub confidence: f32,
}

impl LabelScore {
    /// Create a new label score, clamping confidence into [0, 1]
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Input for a store write: everything except the store-assigned fields
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    /// Sanitized upload filename
    pub filename: String,

    /// Ranked results, best first
    pub predictions: Vec<LabelScore>,
}

impl NewPrediction {
    /// Create a new prediction input
    pub fn new(filename: impl Into<String>, predictions: Vec<LabelScore>) -> Self {
        Self {
            filename: filename.into(),
            predictions,
        }
    }
}

/// One persisted outcome of a single inference request.
///
/// Records are created once and never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Primary key
    pub id: Uuid,

    /// Sanitized upload filename
    pub filename: String,

    /// Ranked results, best first
    pub predictions: Vec<LabelScore>,

    /// Insertion time, used as the history sort key
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    /// Assign identifier and timestamp to a new prediction
    pub fn create(input: NewPrediction) -> Self {
        Self::create_at(input, Utc::now())
    }

    /// Assign identifier and an explicit timestamp
    pub fn create_at(input: NewPrediction, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: input.filename,
            predictions: input.predictions,
            created_at,
        }
    }

    /// Best-ranked result, if any
    pub fn top(&self) -> Option<&LabelScore> {
        self.predictions.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(LabelScore::new("x", 1.2).confidence, 1.0);
        assert_eq!(LabelScore::new("x", -0.1).confidence, 0.0);
        assert_eq!(LabelScore::new("x", f32::NAN).confidence, 0.0);
        assert_eq!(LabelScore::new("x", 0.91).confidence, 0.91);
    }

    #[test]
    fn test_document_shape() {
        let record = PredictionRecord::create(NewPrediction::new(
            "lesion.png",
            vec![LabelScore::new("Melanoma (Melanom)", 0.5)],
        ));

        let doc = serde_json::to_value(&record).unwrap();
        assert_eq!(doc["filename"], "lesion.png");
        assert_eq!(doc["predictions"][0]["label"], "Melanoma (Melanom)");
        assert!(doc["id"].is_string());
        assert!(doc["created_at"].as_str().unwrap().contains('T'));

        let back: PredictionRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = PredictionRecord::create(NewPrediction::new("a.png", vec![]));
        let b = PredictionRecord::create(NewPrediction::new("a.png", vec![]));
        assert_ne!(a.id, b.id);
        assert!(a.top().is_none());
    }
}
