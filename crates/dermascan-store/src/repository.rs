//! Repository trait and pagination

use async_trait::async_trait;
use dermascan_core::{NewPrediction, PredictionRecord, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest page any listing returns
pub const MAX_PAGE_SIZE: usize = 100;

/// Page size when the caller gives none
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Offset pagination over newest-first history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Records to skip from the newest
    pub skip: usize,

    /// Records to return, never above [`MAX_PAGE_SIZE`]
    pub limit: usize,
}

impl Page {
    /// Create a page, silently capping `limit`
    pub fn new(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: limit.min(MAX_PAGE_SIZE),
        }
    }

    /// First page of the default size
    pub fn first() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }

    /// Apply this page to records already sorted newest-first
    pub fn slice(&self, records: Vec<PredictionRecord>) -> Vec<PredictionRecord> {
        records.into_iter().skip(self.skip).take(self.limit).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first()
    }
}

/// Sort newest-first. Records with equal timestamps keep the later-written first.
pub fn sort_newest_first(records: &mut Vec<PredictionRecord>) {
    records.reverse();
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Storage boundary for prediction history.
///
/// Every operation is independent; there is no multi-record atomicity.
#[async_trait]
pub trait PredictionRepository: Send + Sync {
    /// Assign an id and timestamp and write one record
    async fn save(&self, input: NewPrediction) -> Result<PredictionRecord>;

    /// Look up a record by id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PredictionRecord>>;

    /// List records newest-first
    async fn list(&self, page: Page) -> Result<Vec<PredictionRecord>>;

    /// Check that the backing store is reachable
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;
}
