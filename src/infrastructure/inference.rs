use crate::config::AppConfig;
use crate::services::inference::{HttpInferenceBackend, InferenceBackend};
use std::sync::Arc;
use tracing::info;

pub fn setup_inference(config: &AppConfig) -> anyhow::Result<Arc<dyn InferenceBackend>> {
    let backend = HttpInferenceBackend::new(&config.inference_url, config.inference_timeout)?;
    info!(
        "🧠 Inference backend: {} (timeout {}s)",
        backend.detect_url(),
        config.inference_timeout.as_secs()
    );
    Ok(Arc::new(backend))
}
