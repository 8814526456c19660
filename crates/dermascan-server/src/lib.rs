//! DermaScan Server
//!
//! HTTP service that classifies skin-lesion images and keeps a history of
//! predictions.
//!
//! Routes are served at the root and mirrored under `/api/v1`:
//! - `POST /predict`: multipart upload (field `file`), returns ranked labels
//! - `GET /predictions/{id}`, `GET /predictions?skip=&limit=`: history
//! - `GET /`: landing document with recent predictions
//! - `GET /health`, `GET /labels`
//!
//! `GET /metrics` exposes Prometheus metrics.

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use cli::Cli;
pub use config::ServerConfig;
pub use error::AppError;
pub use orchestrator::{Orchestrator, PredictionResponse, Upload};
pub use routes::create_router;
pub use state::AppState;
