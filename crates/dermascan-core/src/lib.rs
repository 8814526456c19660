//! DermaScan Core
//!
//! Core types and utilities shared across DermaScan components.
//!
//! This crate provides:
//! - The error taxonomy used by the classifier, store, and server
//! - Prediction record types persisted by the document store
//! - The class-label catalog mapping classifier outputs to names

pub mod error;
pub mod labels;
pub mod types;

pub use error::{Error, Result};
pub use labels::{ClassLabel, LabelCatalog};
pub use types::{LabelScore, NewPrediction, PredictionRecord};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::labels::{ClassLabel, LabelCatalog};
    pub use crate::types::{LabelScore, NewPrediction, PredictionRecord};
}
