use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Geographic extent in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SatelliteResponse {
    pub success: bool,
    pub image_url: String,
    pub image_id: Uuid,
}

/// Points arrive as `[lat, lon]`, the order the browser map reports them in
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessRequest {
    #[schema(value_type = Vec<Vec<f64>>)]
    pub points: Vec<[f64; 2]>,
    /// Raster returned by `/get_satellite`; the newest raster is used when absent
    #[serde(default)]
    pub image_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProcessResponse {
    pub success: bool,
    pub result_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub status_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    /// One of `pending`, `succeeded`, `failed`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct OsmExportQuery {
    /// JSON object of OSM tags overriding the defaults
    pub tags: Option<String>,
}
