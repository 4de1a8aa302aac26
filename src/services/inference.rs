//! Client side of the `/detect` protocol spoken by the inference backends
//! (the Colab notebook server and the local SAM2 server).
//!
//! Request: multipart POST with an `image` file part (`image/tiff`) and a
//! `points` text part holding a JSON array of `[lon, lat]` pairs.
//! Response: HTTP 200 with the regularized GeoJSON as the body, anything
//! else is a failure whose body is reported verbatim.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("building-detector/", env!("CARGO_PKG_VERSION"));
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to connect to inference server: {0}")]
    Transport(String),

    #[error("Processing failed on inference server (Status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid inference request: {0}")]
    InvalidRequest(String),
}

/// Converts browser `[lat, lon]` pairs to GeoJSON `[lon, lat]` order
pub fn swap_points(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    points.iter().map(|[lat, lon]| [*lon, *lat]).collect()
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Sends one raster and its prompt points (already `[lon, lat]`) and
    /// returns the raw GeoJSON body.
    async fn detect(
        &self,
        image_name: &str,
        image: Bytes,
        points: &[[f64; 2]],
    ) -> Result<Bytes, InferenceError>;

    /// Whether the backend answers its health endpoint
    async fn health_check(&self) -> bool;
}

pub struct HttpInferenceBackend {
    client: reqwest::Client,
    detect_url: String,
    health_url: String,
}

impl HttpInferenceBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| InferenceError::InvalidRequest(format!("bad base URL {}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(InferenceError::InvalidRequest(format!(
                "unsupported scheme in {}",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let base = base_url.trim_end_matches('/');
        Ok(Self {
            client,
            detect_url: format!("{}/detect", base),
            health_url: format!("{}/health", base),
        })
    }

    pub fn detect_url(&self) -> &str {
        &self.detect_url
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn detect(
        &self,
        image_name: &str,
        image: Bytes,
        points: &[[f64; 2]],
    ) -> Result<Bytes, InferenceError> {
        let points_json = serde_json::to_string(points)
            .map_err(|e| InferenceError::InvalidRequest(e.to_string()))?;

        tracing::info!(
            url = %self.detect_url,
            image = %image_name,
            image_bytes = image.len(),
            points = points.len(),
            "Sending detection request"
        );

        let image_part = Part::bytes(image.to_vec())
            .file_name(image_name.to_string())
            .mime_str("image/tiff")
            .map_err(|e| InferenceError::InvalidRequest(e.to_string()))?;

        let form = Form::new()
            .part("image", image_part)
            .text("points", points_json);

        let response = self
            .client
            .post(&self.detect_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let status = response.status();
        tracing::info!("Inference server response status: {}", status);

        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("Inference server error body: {}", body);
            return Err(InferenceError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(&self.health_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Inference health check failed: {}", e);
                false
            }
        }
    }
}
