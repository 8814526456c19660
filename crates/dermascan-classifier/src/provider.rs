//! Process-wide model provider
//!
//! The classifier is loaded at most once per process. Concurrent first
//! callers wait on the same load and all receive the same handle. A failed
//! load is remembered: the service keeps running in degraded mode and every
//! later caller receives the same error without another load attempt.

use crate::classifier::{ModelHandle, ModelLoader};
use dermascan_core::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Load state reported by health checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum ModelStatus {
    /// No load has completed yet
    Loading,
    /// Classifier is loaded and serving
    Ready,
    /// Load failed; predictions are refused
    Degraded(String),
}

/// Lazily loads and caches the classifier
pub struct ModelProvider {
    loader: Arc<dyn ModelLoader>,
    cell: OnceCell<std::result::Result<ModelHandle, String>>,
}

impl ModelProvider {
    /// Create a provider; nothing is loaded until first use
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            cell: OnceCell::new(),
        }
    }

    /// Get the shared classifier, loading it on first call
    pub async fn get_model(&self) -> Result<ModelHandle> {
        let outcome = self
            .cell
            .get_or_init(|| async {
                let description = self.loader.describe();
                info!(model = %description, "Loading classifier");
                let start = Instant::now();

                match self.loader.load().await {
                    Ok(handle) => {
                        info!(
                            model = %description,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Classifier ready"
                        );
                        Ok(handle)
                    }
                    Err(e) => {
                        error!(model = %description, error = %e, "Classifier failed to load");
                        Err(e.to_string())
                    }
                }
            })
            .await;

        match outcome {
            Ok(handle) => Ok(Arc::clone(handle)),
            Err(message) => Err(Error::model_load(message.clone())),
        }
    }

    /// Load eagerly at startup. Failure is logged and cached, not returned.
    pub async fn preload(&self) -> ModelStatus {
        let _ = self.get_model().await;
        self.status()
    }

    /// Current load state without triggering a load
    pub fn status(&self) -> ModelStatus {
        match self.cell.get() {
            None => ModelStatus::Loading,
            Some(Ok(_)) => ModelStatus::Ready,
            Some(Err(message)) => ModelStatus::Degraded(message.clone()),
        }
    }

    /// Description of the configured model
    pub fn describe(&self) -> String {
        self.loader.describe()
    }
}

impl std::fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvider")
            .field("model", &self.loader.describe())
            .field("status", &self.status())
            .finish()
    }
}
