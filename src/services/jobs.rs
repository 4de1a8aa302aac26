use crate::models::JobStatusResponse;
use crate::services::detection::DetectionService;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Succeeded { result_url: String },
    Failed { error: String },
}

#[derive(Debug, Clone)]
struct JobEntry {
    state: JobState,
    updated: Instant,
}

/// In-memory registry of detections running in the background, so a slow
/// backend does not hold the submitting request open.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, JobEntry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a detection on its own task and returns its id immediately
    pub fn submit(
        self: &Arc<Self>,
        detection: Arc<DetectionService>,
        points: Vec<[f64; 2]>,
        image_id: Option<Uuid>,
    ) -> Uuid {
        let job_id = Uuid::new_v4();
        self.set(job_id, JobState::Pending);

        let registry = self.clone();
        tokio::spawn(async move {
            let state = match detection.run(&points, image_id).await {
                Ok(outcome) => {
                    tracing::info!("Detection job {} finished on {}", job_id, outcome.raster);
                    JobState::Succeeded {
                        result_url: outcome.result_url,
                    }
                }
                Err(e) => {
                    tracing::error!("Detection job {} failed: {}", job_id, e);
                    JobState::Failed {
                        error: e.to_string(),
                    }
                }
            };
            registry.set(job_id, state);
        });

        tracing::info!("Detection job {} submitted", job_id);
        job_id
    }

    fn set(&self, job_id: Uuid, state: JobState) {
        self.jobs.insert(
            job_id,
            JobEntry {
                state,
                updated: Instant::now(),
            },
        );
    }

    pub fn get(&self, job_id: &Uuid) -> Option<JobState> {
        self.jobs.get(job_id).map(|entry| entry.state.clone())
    }

    pub fn status(&self, job_id: &Uuid) -> Option<JobStatusResponse> {
        self.get(job_id).map(|state| {
            let (status, result_url, error) = match state {
                JobState::Pending => ("pending", None, None),
                JobState::Succeeded { result_url } => ("succeeded", Some(result_url), None),
                JobState::Failed { error } => ("failed", None, Some(error)),
            };
            JobStatusResponse {
                job_id: *job_id,
                status: status.to_string(),
                result_url,
                error,
            }
        })
    }

    /// Drops finished jobs not touched for longer than `ttl`
    pub fn prune(&self, ttl: Duration) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, entry| {
            entry.state == JobState::Pending || entry.updated.elapsed() < ttl
        });
        before - self.jobs.len()
    }
}
