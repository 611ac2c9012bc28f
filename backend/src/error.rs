use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::db::RepositoryError;
use crate::inference::InferenceError;
use crate::storage::StorageError;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Failure kinds surfaced by the prediction pipeline. None of them is retried
/// internally.
#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("No image uploaded: {0}")]
    InvalidUpload(String),
    #[error("Unreadable image: {0}")]
    UnreadableImage(String),
    #[error("No classifier registered for crop '{0}'")]
    UnsupportedCrop(String),
    #[error("Classification model is not loaded")]
    ModelUnavailable,
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<StorageError> for PredictionError {
    fn from(err: StorageError) -> Self {
        PredictionError::Persistence(err.to_string())
    }
}

impl From<RepositoryError> for PredictionError {
    fn from(err: RepositoryError) -> Self {
        PredictionError::Persistence(err.to_string())
    }
}

impl From<InferenceError> for PredictionError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Decode(msg) => PredictionError::UnreadableImage(msg),
            InferenceError::ModelNotLoaded => PredictionError::ModelUnavailable,
            other => PredictionError::InferenceFailed(other.to_string()),
        }
    }
}

impl ResponseError for PredictionError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictionError::InvalidUpload(_) | PredictionError::UnsupportedCrop(_) => {
                StatusCode::BAD_REQUEST
            }
            PredictionError::UnreadableImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictionError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            PredictionError::InferenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PredictionError::Persistence(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
