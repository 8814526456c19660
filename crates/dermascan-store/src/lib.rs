//! DermaScan Store
//!
//! Prediction history behind the [`PredictionRepository`] trait.
//!
//! Provides:
//! - An append-only JSON-lines document store on disk
//! - An in-memory store for tests and ephemeral deployments
//! - Offset pagination capped at [`MAX_PAGE_SIZE`]

pub mod jsonl;
pub mod memory;
pub mod repository;

pub use jsonl::JsonlRepository;
pub use memory::InMemoryRepository;
pub use repository::{Page, PredictionRepository, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::jsonl::JsonlRepository;
    pub use crate::memory::InMemoryRepository;
    pub use crate::repository::{Page, PredictionRepository};
}
