//! Error types for DermaScan

/// Result type alias using DermaScan's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for DermaScan operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad or missing upload (user-correctable)
    #[error("validation error: {0}")]
    Validation(String),

    /// Classifier could not be loaded; the service stays degraded until restart
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// Uploaded bytes are not a decodable image
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Forward pass or tensor shape failure
    #[error("inference error: {0}")]
    Inference(String),

    /// Store rejected a write or returned unreadable data
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Backing store unreachable
    #[error("store unreachable: {0}")]
    Connectivity(String),

    /// Requested record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new model load error
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new invalid image error
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a new connectivity error
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for failures of the document store rather than of the request
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Connectivity(_) | Self::Io(_) | Self::Serialization(_)
        )
    }

    /// Short machine-readable kind, used in HTTP error bodies and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::ModelLoad(_) => "model_unavailable",
            Self::InvalidImage(_) => "invalid_image",
            Self::Inference(_) => "inference_error",
            Self::Persistence(_) => "persistence_error",
            Self::Connectivity(_) => "store_unreachable",
            Self::NotFound(_) => "not_found",
            Self::Config(_) => "configuration_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failures_are_classified() {
        assert!(Error::persistence("write rejected").is_store_failure());
        assert!(Error::connectivity("refused").is_store_failure());
        assert!(!Error::inference("shape").is_store_failure());
        assert!(!Error::validation("no file").is_store_failure());
    }

    #[test]
    fn test_display_carries_cause() {
        let err = Error::model_load("checkpoint.pt: No such file");
        assert_eq!(err.to_string(), "model load error: checkpoint.pt: No such file");
        assert_eq!(err.kind(), "model_unavailable");
    }
}
