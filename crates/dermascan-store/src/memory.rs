//! In-memory prediction store

use crate::repository::{sort_newest_first, Page, PredictionRepository};
use async_trait::async_trait;
use dermascan_core::{NewPrediction, PredictionRecord, Result};
use parking_lot::RwLock;
use uuid::Uuid;

/// Process-local store; history is lost on restart
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    records: RwLock<Vec<PredictionRecord>>,
}

impl InMemoryRepository {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Insert a fully formed record (fixtures and imports)
    pub fn insert(&self, record: PredictionRecord) {
        self.records.write().push(record);
    }
}

#[async_trait]
impl PredictionRepository for InMemoryRepository {
    async fn save(&self, input: NewPrediction) -> Result<PredictionRecord> {
        let record = PredictionRecord::create(input);
        self.records.write().push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PredictionRecord>> {
        Ok(self.records.read().iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, page: Page) -> Result<Vec<PredictionRecord>> {
        let mut records = self.records.read().clone();
        sort_newest_first(&mut records);
        Ok(page.slice(records))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
