//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dermascan_core::Error;
use serde_json::json;
use tracing::error;

/// Error returned by handlers, rendered as `{"error": {"message", "type"}}`
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Domain error from the classifier or store
    #[error(transparent)]
    Core(#[from] Error),

    /// Malformed request outside the upload itself
    #[error("{0}")]
    BadRequest(String),

    /// Upload declared a non-image content type
    #[error("{0}")]
    UnsupportedMediaType(String),

    /// Upload above the configured ceiling
    #[error("{0}")]
    PayloadTooLarge(String),
}

impl AppError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Core(err) => match err {
                Error::Validation(_) | Error::InvalidImage(_) => StatusCode::BAD_REQUEST,
                Error::NotFound(_) => StatusCode::NOT_FOUND,
                Error::ModelLoad(_) | Error::Persistence(_) | Error::Connectivity(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                Error::Inference(_)
                | Error::Config(_)
                | Error::Io(_)
                | Error::Serialization(_)
                | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Machine-readable error type
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Core(err) => err.kind(),
            AppError::BadRequest(_) => "invalid_request_error",
            AppError::UnsupportedMediaType(_) => "unsupported_media_type",
            AppError::PayloadTooLarge(_) => "payload_too_large",
        }
    }

    /// Metric outcome label: client rejections vs server failures
    pub fn outcome(&self) -> &'static str {
        if self.status().is_client_error() {
            "rejected"
        } else {
            "failed"
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, kind = self.kind(), "Request failed");
        }

        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind(),
            }
        });

        (status, Json(body)).into_response()
    }
}
