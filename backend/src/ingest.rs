use std::sync::Arc;
use uuid::Uuid;

use crate::error::PredictionError;
use crate::storage::BlobStore;

const MAX_EXTENSION_LEN: usize = 10;

/// Raw upload as received from the request boundary.
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// An uploaded image that has been durably written. Only the ingestor can
/// construct one, so holding a `StoredImage` proves the write completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    filename: String,
    byte_length: usize,
}

impl StoredImage {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }
}

#[derive(Clone)]
pub struct ImageIngestor {
    blobs: Arc<dyn BlobStore>,
    max_bytes: usize,
}

impl ImageIngestor {
    pub fn new(blobs: Arc<dyn BlobStore>, max_bytes: usize) -> Self {
        Self { blobs, max_bytes }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub async fn store(
        &self,
        original_filename: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredImage, PredictionError> {
        let extension = upload_extension(original_filename)?;
        if bytes.is_empty() {
            return Err(PredictionError::InvalidUpload("empty image payload".into()));
        }
        if bytes.len() > self.max_bytes {
            return Err(PredictionError::InvalidUpload(format!(
                "image is {} bytes, limit is {}",
                bytes.len(),
                self.max_bytes
            )));
        }

        let filename = format!("{}.{}", Uuid::new_v4(), extension);
        self.blobs.write(&filename, bytes).await?;
        log::info!("Stored upload {} ({} bytes)", filename, bytes.len());

        Ok(StoredImage {
            filename,
            byte_length: bytes.len(),
        })
    }
}

fn upload_extension(original_filename: Option<&str>) -> Result<&str, PredictionError> {
    let name = original_filename
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PredictionError::InvalidUpload("missing filename".into()))?;

    let (_, extension) = name.rsplit_once('.').ok_or_else(|| {
        PredictionError::InvalidUpload(format!("'{}' has no file extension", name))
    })?;

    let valid = !extension.is_empty()
        && extension.len() <= MAX_EXTENSION_LEN
        && extension.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid {
        return Err(PredictionError::InvalidUpload(format!(
            "unsupported file extension '{}'",
            extension
        )));
    }
    Ok(extension)
}
