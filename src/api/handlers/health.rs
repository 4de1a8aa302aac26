use crate::AppState;
use crate::services::storage::PLACEHOLDER;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub inference_backend: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage_status = match state.storage.exists(PLACEHOLDER).await {
        Ok(true) => "ok",
        Ok(false) => "missing placeholder",
        Err(_) => "unavailable",
    };

    let backend_status = if state.detection.backend().health_check().await {
        "reachable"
    } else {
        // The Colab tunnel is often asleep; detection will fail until it is back
        "unreachable"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        storage: storage_status.to_string(),
        inference_backend: backend_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
