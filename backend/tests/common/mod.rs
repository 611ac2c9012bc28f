#![allow(dead_code)]

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use cropdoc::config::ClassifierConfig;
use cropdoc::db::{NewPredictionRecord, PredictionRecord, RecordStore, RepositoryError};
use cropdoc::dispatch::{Dispatcher, StrategyRegistry};
use cropdoc::inference::{
    ClassificationEngine, InferenceError, InferenceModel, ModelSlot, Preprocessor,
};
use cropdoc::ingest::ImageIngestor;
use cropdoc::service::PredictionService;
use cropdoc::storage::{BlobStore, LocalDirStore};

pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

/// Scores an all-white leaf as Late Blight with 0.8, anything else as Healthy.
pub struct WhiteIsLateBlight;

impl InferenceModel for WhiteIsLateBlight {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        if input.iter().all(|&v| v >= 0.999) {
            Ok(vec![0.1, 0.1, 0.8])
        } else {
            Ok(vec![0.7, 0.2, 0.1])
        }
    }
}

/// Record store whose writes always fail.
pub struct BrokenRecords;

#[async_trait]
impl RecordStore for BrokenRecords {
    async fn append(&self, _record: NewPredictionRecord) -> Result<String, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused".into()))
    }

    async fn list_by_user(&self, _user_id: &str) -> Result<Vec<PredictionRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("connection refused".into()))
    }
}

pub fn png(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
    let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb(pixel));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn white_png() -> Vec<u8> {
    png(10, 10, [255, 255, 255])
}

pub fn classifier_config() -> ClassifierConfig {
    ClassifierConfig {
        mock_seed: Some(7),
        ..ClassifierConfig::default()
    }
}

pub fn build_service(
    upload_dir: &Path,
    model: ModelSlot,
    records: Arc<dyn RecordStore>,
) -> PredictionService {
    let config = classifier_config();
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalDirStore::new(upload_dir, "/uploads"));
    let engine = ClassificationEngine::new(
        model,
        Preprocessor::from_config(&config).unwrap(),
        config.model.classes.clone(),
        config.model.method.clone(),
    );
    let registry = StrategyRegistry::from_config(&config, Arc::new(engine));
    PredictionService::new(
        ImageIngestor::new(blobs.clone(), MAX_UPLOAD_BYTES),
        Dispatcher::new(registry, blobs),
        records,
    )
}

pub fn loaded_model() -> ModelSlot {
    ModelSlot::loaded(Arc::new(WhiteIsLateBlight))
}

pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
