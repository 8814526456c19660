//! Shared application state

use crate::config::{ServerConfig, StoreBackend, StoreConfig};
use crate::orchestrator::Orchestrator;
use anyhow::{Context, Result};
use dermascan_classifier::{
    CandleModelLoader, DeviceType, ImagePreprocessor, ModelProvider, ModelSchema, PredictionEngine,
};
use dermascan_core::LabelCatalog;
use dermascan_store::{InMemoryRepository, JsonlRepository, PredictionRepository};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::{info, warn};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Request pipeline
    pub orchestrator: Arc<Orchestrator>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Initialize application state from configuration.
    ///
    /// The schema must parse; the checkpoint itself is loaded later by the
    /// model provider, so a missing or broken checkpoint leaves the server
    /// running in degraded mode.
    pub async fn new(config: ServerConfig, metrics_handle: Option<PrometheusHandle>) -> Result<Self> {
        info!(schema = %config.model.schema.display(), "Reading model schema");
        let schema = ModelSchema::from_file(&config.model.schema).with_context(|| {
            format!("failed to load model schema {}", config.model.schema.display())
        })?;

        let catalog = schema.catalog()?;
        let width = schema.architecture.num_classes().unwrap_or(catalog.len());
        let engine = PredictionEngine::new(catalog, width, config.model.top_k)?;

        let device = DeviceType::parse(&schema.device)
            .and_then(DeviceType::create)
            .or_else(|e| {
                warn!(error = %e, "Requested device unavailable, preprocessing on CPU");
                DeviceType::Cpu.create()
            })?;
        let preprocessor = ImagePreprocessor::from_config(&schema.input).with_device(device);

        let provider = Arc::new(ModelProvider::new(Arc::new(CandleModelLoader::new(schema))));
        let store = open_store(&config.store);

        let orchestrator = Orchestrator::new(provider, preprocessor, engine, store)
            .with_archive_dir(config.upload.archive_dir.clone())
            .with_max_upload_bytes(config.upload.max_bytes);

        Ok(Self::from_parts(config, orchestrator, metrics_handle))
    }

    /// Assemble state from prebuilt parts
    pub fn from_parts(
        config: ServerConfig,
        orchestrator: Orchestrator,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            metrics_handle,
        }
    }

    /// Label catalog in use
    pub fn catalog(&self) -> &LabelCatalog {
        self.orchestrator.engine().catalog()
    }
}

/// Open the configured prediction store
pub fn open_store(config: &StoreConfig) -> Arc<dyn PredictionRepository> {
    match config.backend {
        StoreBackend::Jsonl => Arc::new(JsonlRepository::open(&config.data_dir)),
        StoreBackend::Memory => {
            info!("Using in-memory prediction store; history is lost on restart");
            Arc::new(InMemoryRepository::new())
        }
    }
}
