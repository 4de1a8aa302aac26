use crate::services::detection::DetectionError;
use crate::services::export::ExportError;
use crate::services::imagery::ImageryError;
use crate::services::storage::StorageError;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Every handler failure ends up here and leaves as `{"error": message}`.
/// Messages are passed through as-is so the browser sees the real cause.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Imagery(#[from] ImageryError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(rejection.body_text())
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Imagery(e) => match e {
                ImageryError::TooManyTiles { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Detection(e) => match e {
                DetectionError::NoRaster
                | DetectionError::RasterNotFound(_)
                | DetectionError::InvalidRaster(_) => StatusCode::BAD_REQUEST,
                DetectionError::Inference(_) | DetectionError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!("Request failed ({}): {:?}", status, self);
        } else {
            tracing::warn!("Request rejected ({}): {}", status, message);
        }

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
