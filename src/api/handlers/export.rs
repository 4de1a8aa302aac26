use crate::AppState;
use crate::api::error::AppError;
use crate::models::OsmExportQuery;
use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::header,
    response::{IntoResponse, Response},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

const CLEAN_DOWNLOAD_NAME: &str = "building_detection_result.geojson";
const OSM_DOWNLOAD_NAME: &str = "buildings_for_osm_import.geojson";

fn attachment(body: Vec<u8>, download_name: &str) -> Response {
    let encoded_filename = utf8_percent_encode(download_name, NON_ALPHANUMERIC).to_string();
    let content_disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        download_name, encoded_filename
    );

    (
        [
            (header::CONTENT_TYPE, "application/geo+json".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        body,
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/download",
    responses(
        (status = 200, description = "Detection result with clean properties", content_type = "application/geo+json"),
        (status = 500, description = "No detection has been run yet or the result is unreadable")
    ),
    tag = "export"
)]
pub async fn download(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state.exports.export_clean().await?;
    Ok(attachment(body, CLEAN_DOWNLOAD_NAME))
}

#[utoipa::path(
    get,
    path = "/download_osm",
    params(
        ("tags" = Option<String>, Query, description = "JSON object of OSM tags overriding the defaults")
    ),
    responses(
        (status = 200, description = "Detection result tagged for OSM import", content_type = "application/geo+json"),
        (status = 500, description = "No detection has been run yet or the result is unreadable")
    ),
    tag = "export"
)]
pub async fn download_osm(
    State(state): State<AppState>,
    query: Result<Query<OsmExportQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let tags = match query {
        Ok(Query(query)) => query.tags,
        Err(rejection) => {
            tracing::warn!("Ignoring unparsable OSM export query: {}", rejection.body_text());
            None
        }
    };
    let body = state.exports.export_osm(tags.as_deref()).await?;
    Ok(attachment(body, OSM_DOWNLOAD_NAME))
}
