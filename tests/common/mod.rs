#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::Multipart,
    http::{HeaderMap, Request, StatusCode},
    routing::{get, post},
};
use building_detector::config::AppConfig;
use building_detector::services::imagery::{ImageryError, TileSource};
use building_detector::services::inference::HttpInferenceBackend;
use building_detector::services::storage::{RESULT_FILE, StorageService};
use building_detector::{AppState, create_app};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

/// Nothing listens on the discard port, so connections are refused
pub const UNREACHABLE_BACKEND: &str = "http://127.0.0.1:9";

/// Smallest byte prefix accepted as a TIFF
pub const TIFF_STUB: &[u8] = &[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];

pub const SAMPLE_RESULT: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[13.4041, 52.5196], [13.4045, 52.5196], [13.4045, 52.5199], [13.4041, 52.5196]]]},
            "properties": {"area": 187.26, "value": 1}
        },
        {
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[13.4050, 52.5200], [13.4053, 52.5200], [13.4053, 52.5202], [13.4050, 52.5200]]]},
            "properties": {"value": 2}
        }
    ]
}"#;

/// Serves the same solid-colour PNG for every tile
pub struct PngTiles;

#[async_trait]
impl TileSource for PngTiles {
    async fn fetch_tile(&self, _z: u8, _x: u32, _y: u32) -> Result<Bytes, ImageryError> {
        let tile = image::RgbImage::from_pixel(256, 256, image::Rgb([70, 90, 60]));
        let mut buf = Cursor::new(Vec::new());
        tile.write_to(&mut buf, image::ImageOutputFormat::Png)?;
        Ok(Bytes::from(buf.into_inner()))
    }
}

/// What the stub inference server saw in one `/detect` call
#[derive(Debug, Clone, Default)]
pub struct ReceivedDetect {
    pub points: Option<String>,
    pub image_name: Option<String>,
    pub image_type: Option<String>,
    pub image_len: usize,
}

pub struct StubBackend {
    pub url: String,
    pub received: Arc<Mutex<Vec<ReceivedDetect>>>,
}

/// Starts an inference server on an ephemeral port that answers every
/// `/detect` with `status` and `body`
pub async fn spawn_backend(status: StatusCode, body: &'static str) -> StubBackend {
    let received = Arc::new(Mutex::new(Vec::new()));
    let recorder = received.clone();

    let app = Router::new()
        .route(
            "/detect",
            post(move |mut multipart: Multipart| {
                let recorder = recorder.clone();
                async move {
                    let mut seen = ReceivedDetect::default();
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        let name = field.name().map(str::to_string);
                        match name.as_deref() {
                            Some("image") => {
                                seen.image_name = field.file_name().map(str::to_string);
                                seen.image_type = field.content_type().map(str::to_string);
                                seen.image_len = field.bytes().await.unwrap().len();
                            }
                            Some("points") => seen.points = Some(field.text().await.unwrap()),
                            _ => {}
                        }
                    }
                    recorder.lock().unwrap().push(seen);
                    (status, body)
                }
            }),
        )
        .route("/health", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    StubBackend {
        url: format!("http://{}", addr),
        received,
    }
}

pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    pub app: Router,
}

impl TestApp {
    pub async fn new(backend_url: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::for_dir(dir.path());
        config.inference_url = backend_url.to_string();
        config.inference_timeout = Duration::from_secs(10);
        config.max_tiles = 64;

        let storage = Arc::new(StorageService::new(dir.path()));
        storage.init().await.unwrap();
        let backend =
            Arc::new(HttpInferenceBackend::new(backend_url, config.inference_timeout).unwrap());

        let state = AppState::new(config, storage, Arc::new(PngTiles), backend);
        let app = create_app(state.clone());
        Self { dir, state, app }
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post_bytes(uri, body.to_string().into_bytes()).await
    }

    pub async fn post_bytes(&self, uri: &str, body: Vec<u8>) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        let response = self
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes)
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, _, bytes) = self.get(uri).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    pub async fn seed_raster(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .storage
            .write_atomic(&StorageService::raster_name(&id), TIFF_STUB.to_vec())
            .await
            .unwrap();
        id
    }

    pub async fn seed_result(&self, geojson: &str) {
        self.state
            .storage
            .write_atomic(RESULT_FILE, geojson.as_bytes().to_vec())
            .await
            .unwrap();
    }

    pub fn stored_names(&self) -> Vec<String> {
        stored_names(self.dir.path())
    }
}

pub fn stored_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
