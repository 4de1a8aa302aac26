use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Esri World Imagery, the same basemap the browser map offers as "Satellite".
pub const DEFAULT_TILE_URL: &str =
    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}";

/// Runtime configuration for the detector gateway
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the inference backend, without the `/detect` suffix
    pub inference_url: String,

    /// Upper bound for a single detection round trip (default: 300 s)
    pub inference_timeout: Duration,

    /// Flat directory holding rasters and GeoJSON results
    pub upload_dir: PathBuf,

    /// Maximum request body size in bytes (default: 16 MiB)
    pub max_content_length: usize,

    /// XYZ tile URL with `{z}`, `{x}` and `{y}` placeholders
    pub tile_url_template: String,

    /// Zoom level used for every imagery request (default: 18)
    pub tile_zoom: u8,

    /// Refuse bounding boxes covering more tiles than this (default: 1024)
    pub max_tiles: usize,

    /// Per-tile HTTP timeout (default: 30 s)
    pub tile_timeout: Duration,

    /// Age after which the background worker removes stored files (default: 1 h)
    pub file_ttl: Duration,

    /// How often the background worker runs (default: 5 min)
    pub sweep_interval: Duration,

    /// Value for the `source` tag on exported features
    pub source_label: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            inference_url: "http://127.0.0.1:5001".to_string(),
            inference_timeout: Duration::from_secs(300),
            upload_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("uploads"),
            max_content_length: 16 * 1024 * 1024, // 16 MiB
            tile_url_template: DEFAULT_TILE_URL.to_string(),
            tile_zoom: 18,
            max_tiles: 1024,
            tile_timeout: Duration::from_secs(30),
            file_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            source_label: "Esri World Imagery".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            inference_url: env::var("INFERENCE_SERVER_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(default.inference_url),

            inference_timeout: env_secs("INFERENCE_TIMEOUT_SECS")
                .unwrap_or(default.inference_timeout),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            max_content_length: env::var("MAX_CONTENT_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_content_length),

            tile_url_template: env::var("TILE_URL_TEMPLATE").unwrap_or(default.tile_url_template),

            tile_zoom: env::var("TILE_ZOOM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.tile_zoom),

            max_tiles: env::var("MAX_TILES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_tiles),

            tile_timeout: env_secs("TILE_TIMEOUT_SECS").unwrap_or(default.tile_timeout),

            file_ttl: env_secs("FILE_TTL_SECS").unwrap_or(default.file_ttl),

            sweep_interval: env_secs("SWEEP_INTERVAL_SECS").unwrap_or(default.sweep_interval),

            source_label: env::var("OSM_SOURCE_LABEL").unwrap_or(default.source_label),
        }
    }

    /// Config rooted at a throwaway directory, used by tests
    pub fn for_dir(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            ..Self::default()
        }
    }

    pub fn detect_url(&self) -> String {
        format!("{}/detect", self.inference_url.trim_end_matches('/'))
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
}
