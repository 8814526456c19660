//! Request orchestration
//!
//! A prediction request moves through validate, decode, infer, and persist.
//! Validation and decoding failures reject the request (4xx); classifier
//! failures fail it (5xx). A store failure never changes the outcome: the
//! prediction is still returned, just without an id.

use crate::error::AppError;
use crate::telemetry::{INFERENCE_LATENCY_US, PERSISTENCE_FAILURES_TOTAL, STORE_READ_FAILURES_TOTAL};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dermascan_classifier::{ImagePreprocessor, ModelProvider, PredictionEngine};
use dermascan_core::{Error, LabelScore, NewPrediction, PredictionRecord};
use dermascan_store::{Page, PredictionRepository};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Filename used when sanitizing leaves nothing
const FALLBACK_FILENAME: &str = "upload";

/// One uploaded file as received
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied filename
    pub filename: Option<String>,

    /// Declared content type
    pub content_type: Option<String>,

    /// Raw bytes
    pub bytes: Bytes,
}

/// Result of a completed prediction request
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    /// Store id, absent when the record could not be stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    /// Sanitized filename
    pub filename: String,

    /// Ranked results, best first
    pub predictions: Vec<LabelScore>,

    /// Whether the record reached the store
    pub persisted: bool,

    /// Store timestamp, absent when not persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Drives one request through the pipeline
pub struct Orchestrator {
    provider: Arc<ModelProvider>,
    preprocessor: ImagePreprocessor,
    engine: Arc<PredictionEngine>,
    store: Arc<dyn PredictionRepository>,
    archive_dir: Option<PathBuf>,
    max_upload_bytes: usize,
}

impl Orchestrator {
    /// Create an orchestrator
    pub fn new(
        provider: Arc<ModelProvider>,
        preprocessor: ImagePreprocessor,
        engine: PredictionEngine,
        store: Arc<dyn PredictionRepository>,
    ) -> Self {
        Self {
            provider,
            preprocessor,
            engine: Arc::new(engine),
            store,
            archive_dir: None,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }

    /// Keep a copy of every accepted upload in `dir`
    pub fn with_archive_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.archive_dir = dir;
        self
    }

    /// Set the upload size ceiling
    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    /// Model provider
    pub fn provider(&self) -> &ModelProvider {
        &self.provider
    }

    /// Prediction engine
    pub fn engine(&self) -> &PredictionEngine {
        &self.engine
    }

    /// Prediction store
    pub fn store(&self) -> &dyn PredictionRepository {
        self.store.as_ref()
    }

    /// Upload size ceiling in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Run a full prediction request
    pub async fn predict(&self, upload: Upload) -> Result<PredictionResponse, AppError> {
        let filename = self.validate(&upload)?;
        debug!(filename = %filename, bytes = upload.bytes.len(), "Upload accepted");

        let preprocessor = self.preprocessor.clone();
        let bytes = upload.bytes.clone();
        let tensor = tokio::task::spawn_blocking(move || preprocessor.transform(&bytes))
            .await
            .map_err(|e| Error::internal(format!("decode task failed: {}", e)))??;

        let model = self.provider.get_model().await?;
        let engine = Arc::clone(&self.engine);
        let results = tokio::task::spawn_blocking(move || engine.predict(&tensor, model.as_ref()))
            .await
            .map_err(|e| Error::internal(format!("inference task failed: {}", e)))??;

        metrics::histogram!(INFERENCE_LATENCY_US).record(results.latency_us as f64);

        let predictions = results.label_scores();
        if let Some(top) = results.top() {
            info!(
                filename = %filename,
                label = %top.code,
                confidence = top.confidence,
                latency_us = results.latency_us,
                "Prediction complete"
            );
        }

        if let Some(dir) = &self.archive_dir {
            self.archive(dir, &filename, &upload.bytes).await;
        }

        let (id, created_at) = match self
            .store
            .save(NewPrediction::new(filename.clone(), predictions.clone()))
            .await
        {
            Ok(record) => (Some(record.id), Some(record.created_at)),
            Err(e) => {
                warn!(
                    error = %e,
                    backend = self.store.backend(),
                    "Prediction not stored; returning result without id"
                );
                metrics::counter!(PERSISTENCE_FAILURES_TOTAL).increment(1);
                (None, None)
            }
        };

        Ok(PredictionResponse {
            id,
            filename,
            predictions,
            persisted: id.is_some(),
            created_at,
        })
    }

    /// Look up one record; store failures read as absent
    pub async fn get(&self, id: Uuid) -> Result<PredictionRecord, AppError> {
        match self.store.find_by_id(id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(Error::not_found(format!("prediction {} not found", id)).into()),
            Err(e) => {
                warn!(error = %e, %id, "Prediction lookup failed; reporting not found");
                metrics::counter!(STORE_READ_FAILURES_TOTAL).increment(1);
                Err(Error::not_found(format!("prediction {} not found", id)).into())
            }
        }
    }

    /// List history newest-first; store failures read as empty
    pub async fn history(&self, page: Page) -> Vec<PredictionRecord> {
        match self.store.list(page).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "History listing failed; returning empty list");
                metrics::counter!(STORE_READ_FAILURES_TOTAL).increment(1);
                Vec::new()
            }
        }
    }

    /// Check presence, name, size, and declared type of the upload
    fn validate(&self, upload: &Upload) -> Result<String, AppError> {
        let original = upload.filename.as_deref().unwrap_or("").trim();
        if original.is_empty() {
            return Err(Error::validation("no file selected: the upload has an empty filename").into());
        }

        if upload.bytes.is_empty() {
            return Err(Error::validation("uploaded file is empty").into());
        }

        if upload.bytes.len() > self.max_upload_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "upload of {} bytes exceeds the {} byte limit",
                upload.bytes.len(),
                self.max_upload_bytes
            )));
        }

        if let Some(content_type) = upload.content_type.as_deref() {
            if !is_acceptable_content_type(content_type) {
                return Err(AppError::UnsupportedMediaType(format!(
                    "unsupported content type '{}': upload an image file",
                    content_type
                )));
            }
        }

        Ok(sanitize_filename(original))
    }

    async fn archive(&self, dir: &std::path::Path, filename: &str, bytes: &Bytes) {
        let path = dir.join(filename);
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, bytes).await
        }
        .await;

        match result {
            Ok(()) => debug!(path = %path.display(), "Upload archived"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to archive upload"),
        }
    }
}

/// Image types, plus the generic binary type some clients send for any file
fn is_acceptable_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("image/") || essence == "application/octet-stream"
}

/// Reduce a client filename to a safe single path component.
///
/// Keeps ASCII letters, digits, `.`, `-` and `_`; whitespace becomes `_`;
/// everything else is dropped. Leading and trailing `.`/`_` are trimmed.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("lesion.jpg"), "lesion.jpg");
        assert_eq!(sanitize_filename("my lesion photo.png"), "my_lesion_photo.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\cilt.jpeg"), "cilt.jpeg");
        assert_eq!(sanitize_filename("çilt_görüntü.jpg"), "ilt_grnt.jpg");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("..."), "upload");
    }

    #[test]
    fn test_content_types() {
        assert!(is_acceptable_content_type("image/jpeg"));
        assert!(is_acceptable_content_type("IMAGE/PNG"));
        assert!(is_acceptable_content_type("application/octet-stream"));
        assert!(is_acceptable_content_type("image/png; charset=binary"));
        assert!(!is_acceptable_content_type("text/plain"));
        assert!(!is_acceptable_content_type("application/pdf"));
    }
}
