use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{BlobStore, StorageError, join_url, validate_blob_name};

/// Upload folder on the local filesystem. The directory is created on first
/// write if it does not exist yet.
#[derive(Clone)]
pub struct LocalDirStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into(),
        }
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf, StorageError> {
        validate_blob_name(filename)?;
        Ok(self.root.join(filename))
    }
}

#[async_trait]
impl BlobStore for LocalDirStore {
    async fn write(&self, filename: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(filename)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", self.root.display(), e)))?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::AlreadyExists(filename.to_string()),
                _ => StorageError::Io(format!("{}: {}", path.display(), e)),
            })?;

        let written = async {
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            log::error!("Failed to write upload {}: {}", path.display(), e);
            // No partial file may remain under a name the caller never got back.
            let _ = fs::remove_file(&path).await;
            return Err(StorageError::Io(format!("{}: {}", path.display(), e)));
        }

        log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    async fn read(&self, filename: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(filename)?;
        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(filename.to_string()),
            _ => StorageError::Io(format!("{}: {}", path.display(), e)),
        })
    }

    fn url_for(&self, filename: &str) -> String {
        join_url(&self.public_prefix, filename)
    }
}
