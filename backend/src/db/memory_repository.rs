use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::{NewPredictionRecord, PredictionRecord, RecordStore, RepositoryError};

/// Process-local record store for development and tests. Contents are lost
/// on restart.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    records: Arc<RwLock<Vec<PredictionRecord>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRepository {
    async fn append(&self, record: NewPredictionRecord) -> Result<String, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        let mut records = self
            .records
            .write()
            .map_err(|_| RepositoryError::Unavailable("record lock poisoned".into()))?;
        records.push(record.with_id(id.clone()));
        Ok(id)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<PredictionRecord>, RepositoryError> {
        let records = self
            .records
            .read()
            .map_err(|_| RepositoryError::Unavailable("record lock poisoned".into()))?;
        // Reverse first: the stable sort then keeps later appends ahead on ties.
        let mut owned: Vec<PredictionRecord> = records
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}
