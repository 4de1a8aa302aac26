use crate::services::inference::{InferenceBackend, InferenceError, swap_points};
use crate::services::storage::{RESULT_FILE, StorageError, StorageService};
use crate::utils::validation::verify_magic_bytes;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("No satellite image found")]
    NoRaster,

    #[error("Image file not found: {0}")]
    RasterNotFound(String),

    #[error("Stored raster {0} is not a TIFF image")]
    InvalidRaster(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    /// Raster the detection ran on
    pub raster: String,
    pub result_url: String,
}

/// Selects a raster, forwards it to the inference backend and persists the
/// returned GeoJSON as the current detection result.
pub struct DetectionService {
    storage: Arc<StorageService>,
    backend: Arc<dyn InferenceBackend>,
}

impl DetectionService {
    pub fn new(storage: Arc<StorageService>, backend: Arc<dyn InferenceBackend>) -> Self {
        Self { storage, backend }
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    /// `points` are `[lat, lon]`. With an `image_id` that raster is used,
    /// otherwise the most recently created one.
    pub async fn run(
        &self,
        points: &[[f64; 2]],
        image_id: Option<Uuid>,
    ) -> Result<DetectionOutcome, DetectionError> {
        let transformed = swap_points(points);
        tracing::info!("Received {} points, transformed to [lon, lat]", points.len());
        tracing::debug!("Transformed points: {:?}", transformed);

        let raster = self.select_raster(image_id).await?;
        let image = match self.storage.read(&raster).await {
            Ok(data) => data,
            // Swept or expired between selection and read
            Err(StorageError::NotFound(name)) => return Err(DetectionError::RasterNotFound(name)),
            Err(e) => return Err(e.into()),
        };

        if verify_magic_bytes(&image, "image/tiff").is_err() {
            return Err(DetectionError::InvalidRaster(raster));
        }

        tracing::info!("Using image {} ({} bytes)", raster, image.len());

        let body = self
            .backend
            .detect(&raster, Bytes::from(image), &transformed)
            .await?;

        let result_bytes = body.len();
        self.storage.write_atomic(RESULT_FILE, body).await?;
        tracing::info!("Detection result saved to {} ({} bytes)", RESULT_FILE, result_bytes);

        Ok(DetectionOutcome {
            raster,
            result_url: format!("/uploads/{}", RESULT_FILE),
        })
    }

    async fn select_raster(&self, image_id: Option<Uuid>) -> Result<String, DetectionError> {
        match image_id {
            Some(id) => self
                .storage
                .raster_for(&id)
                .await?
                .ok_or_else(|| DetectionError::RasterNotFound(StorageService::raster_name(&id))),
            None => self
                .storage
                .latest_raster()
                .await?
                .ok_or(DetectionError::NoRaster),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const TIFF_STUB: &[u8] = &[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];

    #[derive(Default)]
    struct RecordingBackend {
        seen: Mutex<Vec<(String, Vec<[f64; 2]>)>>,
        reject_with: Option<u16>,
    }

    #[async_trait]
    impl InferenceBackend for RecordingBackend {
        async fn detect(
            &self,
            image_name: &str,
            _image: Bytes,
            points: &[[f64; 2]],
        ) -> Result<Bytes, InferenceError> {
            self.seen
                .lock()
                .unwrap()
                .push((image_name.to_string(), points.to_vec()));
            match self.reject_with {
                Some(status) => Err(InferenceError::Rejected {
                    status,
                    body: "boom".to_string(),
                }),
                None => Ok(Bytes::from_static(
                    br#"{"type":"FeatureCollection","features":[]}"#,
                )),
            }
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    async fn setup(backend: Arc<RecordingBackend>) -> (TempDir, Arc<StorageService>, DetectionService) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageService::new(dir.path()));
        storage.init().await.unwrap();
        let service = DetectionService::new(storage.clone(), backend);
        (dir, storage, service)
    }

    #[tokio::test]
    async fn test_run_without_raster() {
        let (_dir, _storage, service) = setup(Arc::new(RecordingBackend::default())).await;
        let err = service.run(&[[52.5, 13.4]], None).await.unwrap_err();
        assert!(matches!(err, DetectionError::NoRaster));
        assert_eq!(err.to_string(), "No satellite image found");
    }

    #[tokio::test]
    async fn test_run_swaps_points_and_saves_result() {
        let backend = Arc::new(RecordingBackend::default());
        let (_dir, storage, service) = setup(backend.clone()).await;
        let id = Uuid::new_v4();
        storage
            .write_atomic(&StorageService::raster_name(&id), TIFF_STUB.to_vec())
            .await
            .unwrap();

        let outcome = service.run(&[[52.52, 13.405]], None).await.unwrap();
        assert_eq!(outcome.result_url, "/uploads/building_regularized.geojson");
        assert_eq!(outcome.raster, StorageService::raster_name(&id));

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].0, StorageService::raster_name(&id));
        assert_eq!(seen[0].1, vec![[13.405, 52.52]]);
        drop(seen);
        assert!(storage.exists(RESULT_FILE).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejection_leaves_previous_result() {
        let backend = Arc::new(RecordingBackend {
            reject_with: Some(500),
            ..Default::default()
        });
        let (_dir, storage, service) = setup(backend).await;
        storage
            .write_atomic(&StorageService::raster_name(&Uuid::new_v4()), TIFF_STUB.to_vec())
            .await
            .unwrap();
        storage.write_atomic(RESULT_FILE, b"previous".to_vec()).await.unwrap();

        let err = service.run(&[[1.0, 2.0]], None).await.unwrap_err();
        assert!(err.to_string().contains("(Status 500): boom"));
        assert_eq!(storage.read(RESULT_FILE).await.unwrap(), b"previous");
    }

    #[tokio::test]
    async fn test_unknown_image_id() {
        let (_dir, _storage, service) = setup(Arc::new(RecordingBackend::default())).await;
        let err = service
            .run(&[[1.0, 2.0]], Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectionError::RasterNotFound(_)));
    }

    #[tokio::test]
    async fn test_non_tiff_raster_is_refused() {
        let backend = Arc::new(RecordingBackend::default());
        let (_dir, storage, service) = setup(backend.clone()).await;
        storage
            .write_atomic(&StorageService::raster_name(&Uuid::new_v4()), b"<html>".to_vec())
            .await
            .unwrap();

        let err = service.run(&[[1.0, 2.0]], None).await.unwrap_err();
        assert!(matches!(err, DetectionError::InvalidRaster(_)));
        assert!(backend.seen.lock().unwrap().is_empty());
    }
}
