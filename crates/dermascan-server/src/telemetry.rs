//! Logging and metrics setup

use crate::config::LogFormat;
use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Prediction requests by outcome (`completed`, `rejected`, `failed`)
pub const REQUESTS_TOTAL: &str = "dermascan_requests_total";

/// Forward pass latency
pub const INFERENCE_LATENCY_US: &str = "dermascan_inference_latency_us";

/// Predictions that completed but could not be stored
pub const PERSISTENCE_FAILURES_TOTAL: &str = "dermascan_persistence_failures_total";

/// History reads that degraded to an empty result
pub const STORE_READ_FAILURES_TOTAL: &str = "dermascan_store_read_failures_total";

/// Initialize tracing/logging
pub fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("dermascan=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dermascan=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

/// Install the Prometheus recorder and return the handle for rendering
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    describe_metrics();
    info!("Metrics exporter initialized");
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!(REQUESTS_TOTAL, "Prediction requests by outcome");
    metrics::describe_histogram!(
        INFERENCE_LATENCY_US,
        metrics::Unit::Microseconds,
        "Classifier forward pass latency in microseconds"
    );
    metrics::describe_counter!(
        PERSISTENCE_FAILURES_TOTAL,
        "Predictions served without being stored"
    );
    metrics::describe_counter!(
        STORE_READ_FAILURES_TOTAL,
        "History reads answered empty because the store failed"
    );
}
