use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::common::deadline::DeadlineError;
use crate::common::response::ApiError;
use crate::infrastructure::queue::QueueError;
use crate::infrastructure::storage::StorageError;
use crate::modules::video::repository::RepositoryError;

/// Request-level failures of the ingestion and listing paths.
///
/// The three write variants mark how far an upload got: `StorageWrite` left nothing
/// behind, `RecordInsert` left an orphaned source blob, `JobSignal` left a `queued`
/// record that no worker was told about.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("object storage write failed: {0}")]
    StorageWrite(#[source] DeadlineError<StorageError>),
    #[error("video record insert failed: {0}")]
    RecordInsert(#[source] DeadlineError<RepositoryError>),
    #[error("video record read failed: {0}")]
    RecordRead(#[source] DeadlineError<RepositoryError>),
    #[error("transcoding job signal failed: {0}")]
    JobSignal(#[source] DeadlineError<QueueError>),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::StorageWrite(_)
            | AppError::RecordInsert(_)
            | AppError::RecordRead(_)
            | AppError::JobSignal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to clients. Backend details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput(_) | AppError::PayloadTooLarge { .. } => self.to_string(),
            AppError::StorageWrite(_) => "Failed to store the uploaded file".to_string(),
            AppError::RecordInsert(_) => "Failed to record the uploaded video".to_string(),
            AppError::RecordRead(_) => "Failed to load videos".to_string(),
            AppError::JobSignal(_) => "Failed to queue the video for transcoding".to_string(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = err.status_code();
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }
        ApiError(err.public_message(), status)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
