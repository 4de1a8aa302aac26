use crate::AppState;
use crate::api::error::AppError;
use crate::models::{JobAccepted, JobStatusResponse, ProcessRequest, ProcessResponse};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/process",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Detection result stored", body = ProcessResponse),
        (status = 400, description = "No raster available or malformed request"),
        (status = 500, description = "Inference server failed or unreachable")
    ),
    tag = "detection"
)]
pub async fn process(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, AppError> {
    let Json(req) = payload?;

    let outcome = state.detection.run(&req.points, req.image_id).await?;
    tracing::info!("Detection on {} stored at {}", outcome.raster, outcome.result_url);

    Ok(Json(ProcessResponse {
        success: true,
        result_url: outcome.result_url,
    }))
}

#[utoipa::path(
    post,
    path = "/process/jobs",
    request_body = ProcessRequest,
    responses(
        (status = 202, description = "Detection started in the background", body = JobAccepted),
        (status = 400, description = "Malformed request")
    ),
    tag = "detection"
)]
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    let Json(req) = payload?;

    let job_id = state
        .jobs
        .submit(state.detection.clone(), req.points, req.image_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id,
            status_url: format!("/process/jobs/{}", job_id),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/process/jobs/{id}",
    params(
        ("id" = String, Path, description = "Job ID returned by /process/jobs")
    ),
    responses(
        (status = 200, description = "Current job state", body = JobStatusResponse),
        (status = 404, description = "Unknown or expired job")
    ),
    tag = "detection"
)]
pub async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let job_id = Uuid::parse_str(&id)
        .map_err(|_| AppError::BadRequest(format!("Invalid job id: {}", id)))?;

    state
        .jobs
        .status(&job_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Job not found: {}", job_id)))
}
