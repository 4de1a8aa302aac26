use crate::AppState;
use crate::api::error::AppError;
use crate::services::storage::StorageError;
use crate::utils::validation::{content_type_for, sanitize_filename};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

#[utoipa::path(
    get,
    path = "/uploads/{filename}",
    params(
        ("filename" = String, Path, description = "Name of a stored raster or GeoJSON file")
    ),
    responses(
        (status = 200, description = "Raw file bytes"),
        (status = 400, description = "Invalid filename"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn uploaded_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let filename =
        sanitize_filename(&filename).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let file = match tokio::fs::File::open(state.storage.path_for(&filename)).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("File not found: {}", filename)));
        }
        Err(e) => return Err(StorageError::from(e).into()),
    };
    let content_length = file.metadata().await.map(|m| m.len()).ok();

    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = ([(header::CONTENT_TYPE, content_type_for(&filename))], body).into_response();

    if let Some(len) = content_length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    Ok(response)
}
