use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use super::{BlobStore, StorageError, content_type_for, join_url, validate_blob_name};

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
    key_prefix: String,
    public_prefix: String,
}

impl S3Service {
    pub fn new(
        client: Client,
        bucket_name: String,
        key_prefix: String,
        public_prefix: String,
    ) -> Self {
        Self {
            client,
            bucket_name,
            key_prefix,
            public_prefix,
        }
    }

    pub fn generate_s3_key(key_prefix: &str, filename: &str) -> String {
        if key_prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", key_prefix.trim_end_matches('/'), filename)
        }
    }

    fn key_for(&self, filename: &str) -> Result<String, StorageError> {
        validate_blob_name(filename)?;
        Ok(Self::generate_s3_key(&self.key_prefix, filename))
    }
}

#[async_trait]
impl BlobStore for S3Service {
    async fn write(&self, filename: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let s3_key = self.key_for(filename)?;
        let body = ByteStream::from(bytes.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&s3_key)
            .body(body)
            .content_type(content_type_for(filename))
            .if_none_match("*")
            .send()
            .await
            .map_err(|e| {
                let precondition_failed = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 412)
                    .unwrap_or(false);
                if precondition_failed {
                    StorageError::AlreadyExists(filename.to_string())
                } else {
                    log::error!("S3 put_object failed for {}: {:?}", s3_key, e);
                    StorageError::S3(e.to_string())
                }
            })?;

        log::debug!("Uploaded {} bytes to s3://{}/{}", bytes.len(), self.bucket_name, s3_key);
        Ok(())
    }

    async fn read(&self, filename: &str) -> Result<Vec<u8>, StorageError> {
        let s3_key = self.key_for(filename)?;
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(&s3_key)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    StorageError::NotFound(filename.to_string())
                } else {
                    StorageError::S3(e.to_string())
                }
            })?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    fn url_for(&self, filename: &str) -> String {
        join_url(&self.public_prefix, filename)
    }
}
