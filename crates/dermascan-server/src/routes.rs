//! HTTP routes and handlers

use axum::{
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::QueryRejection,
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dermascan_classifier::ModelStatus;
use dermascan_core::{Error, LabelCatalog, PredictionRecord};
use dermascan_store::Page;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::orchestrator::{PredictionResponse, Upload};
use crate::state::AppState;
use crate::telemetry::REQUESTS_TOTAL;

/// Name of the multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_bytes + MULTIPART_OVERHEAD;

    let api = Router::new()
        .route("/", get(index))
        .route("/predict", post(predict))
        .route("/predictions", get(list_predictions))
        .route("/predictions/:id", get(get_prediction))
        .route("/health", get(health_check))
        .route("/labels", get(labels));

    Router::new()
        .merge(api.clone())
        .nest("/api/v1", api)
        .route("/metrics", get(render_metrics))
        .fallback(fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Landing document with recent history
#[derive(Debug, Serialize)]
struct IndexResponse {
    message: &'static str,
    predictions: Vec<PredictionRecord>,
}

async fn index(State(state): State<AppState>) -> Json<IndexResponse> {
    let page = Page::new(0, state.config.pagination.default_limit);
    Json(IndexResponse {
        message: "Welcome to the DermaScan API",
        predictions: state.orchestrator.history(page).await,
    })
}

async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, AppError> {
    let outcome = async {
        let mut multipart = multipart.map_err(|e| AppError::BadRequest(e.body_text()))?;
        let upload = read_upload(&mut multipart, state.orchestrator.max_upload_bytes()).await?;
        state.orchestrator.predict(upload).await
    }
    .await;

    let label = match &outcome {
        Ok(_) => "completed",
        Err(e) => e.outcome(),
    };
    metrics::counter!(REQUESTS_TOTAL, "outcome" => label).increment(1);

    outcome.map(Json)
}

/// Pull the `file` field out of the form, ignoring any other fields
async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!(field = ?field.name(), "Ignoring multipart field");
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, max_bytes))?;

        return Ok(Upload {
            filename,
            content_type,
            bytes,
        });
    }

    Err(Error::validation(format!(
        "no file uploaded: expected a multipart field named '{}'",
        UPLOAD_FIELD
    ))
    .into())
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("upload exceeds the {} byte limit", max_bytes))
    } else {
        AppError::BadRequest(err.body_text())
    }
}

async fn get_prediction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PredictionRecord>, AppError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::BadRequest(format!("malformed prediction id '{}'", id)))?;
    state.orchestrator.get(id).await.map(Json)
}

#[derive(Debug, Deserialize)]
struct ListParams {
    skip: Option<usize>,
    limit: Option<usize>,
}

async fn list_predictions(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<PredictionRecord>>, AppError> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let pagination = &state.config.pagination;

    let limit = params
        .limit
        .unwrap_or(pagination.default_limit)
        .min(pagination.max_limit);
    let page = Page::new(params.skip.unwrap_or(0), limit);

    Ok(Json(state.orchestrator.history(page).await))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model: ModelStatus,
    store: StoreHealth,
}

#[derive(Debug, Serialize)]
struct StoreHealth {
    backend: &'static str,
    reachable: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.orchestrator.provider().status();
    let store = state.orchestrator.store();
    let reachable = store.ping().await.is_ok();

    let status = match (&model, reachable) {
        (ModelStatus::Ready, true) => "ok",
        (ModelStatus::Loading, _) => "starting",
        _ => "degraded",
    };

    Json(HealthResponse {
        status,
        model,
        store: StoreHealth {
            backend: store.backend(),
            reachable,
        },
    })
}

async fn labels(State(state): State<AppState>) -> Json<LabelCatalog> {
    Json(state.catalog().clone())
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

async fn fallback() -> AppError {
    Error::not_found("no such route").into()
}
