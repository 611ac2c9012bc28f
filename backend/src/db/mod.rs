pub mod dynamodb_repository;
pub mod memory_repository;
pub mod supabase_repository;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::ClassificationResult;
use crate::ingest::StoredImage;

pub use dynamodb_repository::DynamoDbRepository;
pub use memory_repository::MemoryRepository;
pub use supabase_repository::SupabaseRepository;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Supabase error: {0}")]
    Supabase(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// A classification event about to be persisted. Built only from a
/// `StoredImage`, so the image write always precedes the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPredictionRecord {
    pub user_id: String,
    pub crop: String,
    pub disease: String,
    pub method: String,
    pub confidence: Option<f64>,
    #[serde(rename = "image")]
    pub image_filename: String,
    pub created_at: DateTime<Utc>,
}

impl NewPredictionRecord {
    pub fn new(
        user_id: &str,
        crop: &str,
        image: &StoredImage,
        result: &ClassificationResult,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            crop: crop.to_string(),
            disease: result.label.clone(),
            method: result.method.clone(),
            confidence: result.confidence,
            image_filename: image.filename().to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(self, id: String) -> PredictionRecord {
        PredictionRecord {
            id,
            user_id: self.user_id,
            crop: self.crop,
            disease: self.disease,
            method: self.method,
            confidence: self.confidence,
            image_filename: self.image_filename,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub user_id: String,
    pub crop: String,
    pub disease: String,
    pub method: String,
    pub confidence: Option<f64>,
    #[serde(rename = "image")]
    pub image_filename: String,
    pub created_at: DateTime<Utc>,
}

/// Fixed-width UTC timestamps so that lexical order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Append-only store of classification events.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists the record atomically and returns the store-assigned id.
    async fn append(&self, record: NewPredictionRecord) -> Result<String, RepositoryError>;

    /// Records owned by exactly `user_id`, newest `created_at` first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<PredictionRecord>, RepositoryError>;
}
