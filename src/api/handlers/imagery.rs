use crate::AppState;
use crate::api::error::AppError;
use crate::models::{BoundingBox, SatelliteResponse};
use axum::{Json, extract::State, extract::rejection::JsonRejection};

#[utoipa::path(
    post,
    path = "/get_satellite",
    request_body = BoundingBox,
    responses(
        (status = 200, description = "Raster stored", body = SatelliteResponse),
        (status = 400, description = "Malformed request or extent too large"),
        (status = 500, description = "Tile download or encoding failed")
    ),
    tag = "imagery"
)]
pub async fn get_satellite(
    State(state): State<AppState>,
    payload: Result<Json<BoundingBox>, JsonRejection>,
) -> Result<Json<SatelliteResponse>, AppError> {
    let Json(bbox) = payload?;
    tracing::info!(
        "Received bbox: [{}, {}, {}, {}]",
        bbox.west,
        bbox.south,
        bbox.east,
        bbox.north
    );

    let raster = state.imagery.acquire(&bbox).await?;

    Ok(Json(SatelliteResponse {
        success: true,
        image_url: format!("/uploads/{}", raster.filename),
        image_id: raster.image_id,
    }))
}
