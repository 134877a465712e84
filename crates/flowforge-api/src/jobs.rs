//! Bounded async job queue backing the `/async` endpoint variants (C13, spec section 4.12).
//!
//! A fixed pool of `JOB_QUEUE_WORKERS` tokio tasks consumes from a single mpsc channel;
//! `submit` never blocks on a worker being free, it only enqueues. Jobs are tenant-scoped:
//! `get` returns `None` for a job belonging to a different tenant, indistinguishable from a
//! genuinely missing job so callers can't probe for other tenants' job ids.

use crate::metrics::MetricsRegistry;
use dashmap::DashMap;
use flowforge_core::enums::{JobStatus, JobType};
use flowforge_core::error::Result;
use flowforge_core::models::AsyncJobRecord;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uuid::Uuid;

pub type JobFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>;

struct JobMessage {
    job_id: String,
    future: JobFuture,
}

/// Shared job registry plus a bounded worker pool draining a single queue.
pub struct JobQueue {
    jobs: Arc<DashMap<String, AsyncJobRecord>>,
    sender: mpsc::Sender<JobMessage>,
    metrics: Arc<MetricsRegistry>,
}

impl JobQueue {
    pub fn new(workers: usize, metrics: Arc<MetricsRegistry>) -> Self {
        let (sender, receiver) = mpsc::channel::<JobMessage>(256);
        let jobs: Arc<DashMap<String, AsyncJobRecord>> = Arc::new(DashMap::new());
        let receiver = Arc::new(AsyncMutex::new(receiver));

        for _ in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let jobs = Arc::clone(&jobs);
            let metrics = Arc::clone(&metrics);
            tokio::spawn(async move {
                loop {
                    let message = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    let Some(message) = message else { break };
                    run_job(&jobs, &metrics, message).await;
                }
            });
        }

        JobQueue { jobs, sender, metrics }
    }

    /// Enqueues `future` for background execution and returns its immediately-visible
    /// `Queued` record. `future` must already be scoped to the submitting tenant.
    pub async fn submit(
        &self,
        job_type: JobType,
        tenant_id: &str,
        agent_name: &str,
        metadata: HashMap<String, serde_json::Value>,
        future: JobFuture,
    ) -> AsyncJobRecord {
        let job_id = format!("job-{}", Uuid::new_v4());
        let now = chrono::Utc::now();
        let record = AsyncJobRecord {
            job_id: job_id.clone(),
            job_type,
            tenant_id: tenant_id.to_string(),
            agent_name: agent_name.to_string(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
            metadata,
        };
        self.jobs.insert(job_id.clone(), record.clone());
        self.metrics.record_job_submitted();
        // A full channel only happens under pathological backlog; dropping the record's
        // pending run and marking it failed keeps `get` consistent with reality.
        if self.sender.send(JobMessage { job_id: job_id.clone(), future }).await.is_err() {
            self.fail_job(&job_id, "job queue is shutting down");
        }
        record
    }

    pub fn get(&self, tenant_id: &str, job_id: &str) -> Option<AsyncJobRecord> {
        self.jobs.get(job_id).map(|entry| entry.clone()).filter(|record| record.tenant_id == tenant_id)
    }

    fn fail_job(&self, job_id: &str, message: &str) {
        if let Some(mut entry) = self.jobs.get_mut(job_id) {
            entry.status = JobStatus::Failed;
            entry.error = Some(message.to_string());
            entry.updated_at = chrono::Utc::now();
        }
        self.metrics.record_job_failed();
    }
}

async fn run_job(jobs: &DashMap<String, AsyncJobRecord>, metrics: &MetricsRegistry, message: JobMessage) {
    if let Some(mut entry) = jobs.get_mut(&message.job_id) {
        entry.status = JobStatus::Running;
        entry.updated_at = chrono::Utc::now();
    }

    let outcome = message.future.await;

    if let Some(mut entry) = jobs.get_mut(&message.job_id) {
        entry.updated_at = chrono::Utc::now();
        match outcome {
            Ok(result) => {
                entry.status = JobStatus::Succeeded;
                entry.result = Some(result);
                metrics.record_job_succeeded();
            }
            Err(err) => {
                entry.status = JobStatus::Failed;
                entry.error = Some(err.to_string());
                metrics.record_job_failed();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn submitted_job_transitions_to_succeeded() {
        let metrics = Arc::new(MetricsRegistry::new());
        let queue = JobQueue::new(1, metrics);
        let record = queue
            .submit(JobType::Optimize, "tenant-a", "demo", HashMap::new(), Box::pin(async { Ok(serde_json::json!(1)) }))
            .await;
        assert_eq!(record.status, JobStatus::Queued);

        for _ in 0..50 {
            if let Some(job) = queue.get("tenant-a", &record.job_id) {
                if job.status == JobStatus::Succeeded {
                    assert_eq!(job.result.unwrap(), serde_json::json!(1));
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job did not complete in time");
    }

    #[tokio::test]
    async fn job_from_another_tenant_is_invisible() {
        let metrics = Arc::new(MetricsRegistry::new());
        let queue = JobQueue::new(1, metrics);
        let record = queue
            .submit(JobType::Optimize, "tenant-a", "demo", HashMap::new(), Box::pin(async { Ok(serde_json::json!(1)) }))
            .await;
        assert!(queue.get("tenant-b", &record.job_id).is_none());
    }

    #[tokio::test]
    async fn failing_future_marks_job_failed_with_error_message() {
        let metrics = Arc::new(MetricsRegistry::new());
        let queue = JobQueue::new(1, metrics);
        let record = queue
            .submit(
                JobType::ManualParity,
                "tenant-a",
                "demo",
                HashMap::new(),
                Box::pin(async { Err(flowforge_core::error::ForgeError::Validation("bad".to_string())) }),
            )
            .await;

        for _ in 0..50 {
            if let Some(job) = queue.get("tenant-a", &record.job_id) {
                if job.status == JobStatus::Failed {
                    assert!(job.error.unwrap().contains("bad"));
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job did not fail in time");
    }
}
