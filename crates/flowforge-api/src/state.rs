//! Shared process state handed to every handler (grounded in `dashflow-registry`'s
//! `AppState`: one `Clone`-able struct carrying `Arc`-wrapped swappable backends plus
//! process-wide config, rather than passing each dependency through the router
//! individually).

use crate::idempotency::IdempotencyStore;
use crate::jobs::JobQueue;
use crate::metrics::MetricsRegistry;
use crate::middleware::RateLimiterState;
use flowforge_core::config::Settings;
use flowforge_registry::{ArtifactStore, Repository};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_RATE_LIMIT_RPM: u32 = 120;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub repository: Arc<dyn Repository>,
    pub artifact_store: Arc<dyn ArtifactStore>,
    pub jobs: Arc<JobQueue>,
    pub idempotency: Arc<IdempotencyStore>,
    pub metrics: Arc<MetricsRegistry>,
    pub rate_limiter: Arc<RateLimiterState>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        repository: Arc<dyn Repository>,
        artifact_store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let jobs = Arc::new(JobQueue::new(settings.job_queue_workers, Arc::clone(&metrics)));
        let rate_limiter = Arc::new(RateLimiterState::new(DEFAULT_RATE_LIMIT_RPM, Duration::from_secs(60)));
        AppState {
            settings,
            repository,
            artifact_store,
            jobs,
            idempotency: Arc::new(IdempotencyStore::new()),
            metrics,
            rate_limiter,
        }
    }
}
