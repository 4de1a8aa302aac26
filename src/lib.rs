pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::detection::DetectionService;
use crate::services::export::ExportService;
use crate::services::imagery::{ImageryService, TileSource};
use crate::services::inference::InferenceBackend;
use crate::services::jobs::JobRegistry;
use crate::services::storage::StorageService;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::imagery::get_satellite,
        api::handlers::detection::process,
        api::handlers::detection::submit_job,
        api::handlers::detection::job_status,
        api::handlers::export::download,
        api::handlers::export::download_osm,
        api::handlers::uploads::uploaded_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::BoundingBox,
            models::SatelliteResponse,
            models::ProcessRequest,
            models::ProcessResponse,
            models::JobAccepted,
            models::JobStatusResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "imagery", description = "Satellite imagery acquisition"),
        (name = "detection", description = "Building detection via the inference backend"),
        (name = "export", description = "GeoJSON downloads"),
        (name = "files", description = "Stored rasters and results"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<StorageService>,
    pub imagery: Arc<ImageryService>,
    pub detection: Arc<DetectionService>,
    pub exports: Arc<ExportService>,
    pub jobs: Arc<JobRegistry>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: Arc<StorageService>,
        tiles: Arc<dyn TileSource>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        let imagery = Arc::new(ImageryService::new(
            tiles,
            storage.clone(),
            config.tile_zoom,
            config.max_tiles,
        ));
        let detection = Arc::new(DetectionService::new(storage.clone(), backend));
        let exports = Arc::new(ExportService::new(
            storage.clone(),
            config.source_label.clone(),
        ));

        Self {
            config,
            storage,
            imagery,
            detection,
            exports,
            jobs: Arc::new(JobRegistry::new()),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::pages::index))
        .route("/health", get(api::handlers::health::health_check))
        .route("/get_satellite", post(api::handlers::imagery::get_satellite))
        .route("/process", post(api::handlers::detection::process))
        .route("/process/jobs", post(api::handlers::detection::submit_job))
        .route("/process/jobs/:id", get(api::handlers::detection::job_status))
        .route("/download", get(api::handlers::export::download))
        .route("/download_osm", get(api::handlers::export::download_osm))
        .route(
            "/uploads/:filename",
            get(api::handlers::uploads::uploaded_file),
        )
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_content_length,
        ))
        .with_state(state)
}
