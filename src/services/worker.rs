use crate::services::jobs::JobRegistry;
use crate::services::storage::StorageService;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically expires stored files and finished detection jobs
pub struct BackgroundWorker {
    storage: Arc<StorageService>,
    jobs: Arc<JobRegistry>,
    ttl: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        storage: Arc<StorageService>,
        jobs: Arc<JobRegistry>,
        ttl: Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            storage,
            jobs,
            ttl,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Background worker started (ttl={:?}, interval={:?})",
            self.ttl,
            self.interval
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    pub async fn perform_cleanup(&self) {
        tracing::debug!("🧹 Running background cleanup tasks...");

        // 1. Expire stored files
        match self.storage.expire_older_than(self.ttl).await {
            Ok(0) => {}
            Ok(n) => tracing::info!("Expired {} stored files", n),
            Err(e) => tracing::error!("Failed to expire stored files: {}", e),
        }

        // 2. Forget finished jobs
        let pruned = self.jobs.prune(self.ttl);
        if pruned > 0 {
            tracing::info!("Pruned {} finished detection jobs", pruned);
        }
    }
}
