use crate::config::AppConfig;
use crate::services::storage::StorageService;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<StorageService>> {
    info!("📂 Upload directory: {}", config.upload_dir.display());

    let storage = StorageService::new(&config.upload_dir);
    storage.init().await.with_context(|| {
        format!(
            "failed to prepare upload directory {}",
            config.upload_dir.display()
        )
    })?;

    Ok(Arc::new(storage))
}
