pub mod local_store;
pub mod s3_service;

use async_trait::async_trait;

pub use local_store::LocalDirStore;
pub use s3_service::S3Service;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Blob already exists: {0}")]
    AlreadyExists(String),
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Invalid blob name: {0}")]
    InvalidName(String),
}

/// Directory-like surface keyed by flat filenames.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes a new blob. Existing blobs are never overwritten.
    async fn write(&self, filename: &str, bytes: &[u8]) -> Result<(), StorageError>;

    async fn read(&self, filename: &str) -> Result<Vec<u8>, StorageError>;

    /// Reference a downstream viewer can use to fetch the blob.
    fn url_for(&self, filename: &str) -> String;
}

/// Blob names are single path segments: no separators, no dot-only names.
pub fn validate_blob_name(filename: &str) -> Result<(), StorageError> {
    let valid = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(filename.to_string()))
    }
}

pub fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

pub(crate) fn join_url(prefix: &str, filename: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), filename)
}
