use std::sync::Arc;

use shared::{HistoryEntry, HistoryResponse, PredictionResponse};

use crate::db::{NewPredictionRecord, RecordStore, format_timestamp};
use crate::dispatch::Dispatcher;
use crate::error::PredictionError;
use crate::ingest::{ImageIngestor, ImageUpload};
use crate::storage::StorageError;

/// Entry point used by the HTTP layer. `user_id` is trusted as already
/// verified by the caller.
#[derive(Clone)]
pub struct PredictionService {
    ingestor: ImageIngestor,
    dispatcher: Dispatcher,
    records: Arc<dyn RecordStore>,
}

impl PredictionService {
    pub fn new(
        ingestor: ImageIngestor,
        dispatcher: Dispatcher,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            ingestor,
            dispatcher,
            records,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.ingestor.max_bytes()
    }

    /// Store the upload, classify it, then append the history record. Any
    /// failure aborts the request; nothing is reported as success unless the
    /// record was persisted.
    pub async fn handle_prediction(
        &self,
        user_id: &str,
        crop: &str,
        upload: ImageUpload,
    ) -> Result<PredictionResponse, PredictionError> {
        let stored = self
            .ingestor
            .store(upload.filename.as_deref(), &upload.bytes)
            .await?;
        let result = self.dispatcher.dispatch(crop, &stored).await?;

        let record = NewPredictionRecord::new(user_id, crop, &stored, &result);
        let record_id = self.records.append(record).await.map_err(|e| {
            log::error!(
                "Failed to record prediction for {} ({}): {}",
                user_id,
                stored.filename(),
                e
            );
            PredictionError::from(e)
        })?;

        log::info!(
            "Prediction {} for user {}: {} -> {}",
            record_id,
            user_id,
            crop,
            result.label
        );

        Ok(PredictionResponse {
            record_id,
            crop: crop.to_string(),
            disease: result.label,
            method: result.method,
            confidence: result.confidence,
            image_url: self.ingestor.blobs().url_for(stored.filename()),
            image_filename: stored.filename().to_string(),
        })
    }

    pub async fn history(&self, user_id: &str) -> Result<HistoryResponse, PredictionError> {
        let records = self.records.list_by_user(user_id).await?;
        let blobs = self.ingestor.blobs();
        Ok(HistoryResponse {
            records: records
                .into_iter()
                .map(|r| HistoryEntry {
                    image_url: blobs.url_for(&r.image_filename),
                    id: r.id,
                    crop: r.crop,
                    disease: r.disease,
                    method: r.method,
                    confidence: r.confidence,
                    image: r.image_filename,
                    created_at: format_timestamp(&r.created_at),
                })
                .collect(),
        })
    }

    pub async fn image(&self, filename: &str) -> Result<Vec<u8>, StorageError> {
        self.ingestor.blobs().read(filename).await
    }
}
