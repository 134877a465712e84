//! Process-wide request/job counters, exported as a JSON snapshot (C18, spec section 4.17).
//!
//! This is deliberately not a Prometheus client: the `/metrics` contract in spec section 6
//! is a bespoke JSON document, not the Prometheus text exposition format, so the registry
//! is a plain counter map behind a mutex rather than a `prometheus::Registry`.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
struct EndpointCounters {
    count: u64,
    error_count: u64,
    latency_ms_sum: f64,
}

#[derive(Debug, Serialize)]
pub struct EndpointSnapshot {
    pub count: u64,
    pub error_count: u64,
    pub latency_ms_sum: f64,
    pub latency_ms_avg: f64,
}

#[derive(Debug, Default, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub errors_total: u64,
    pub async_jobs_submitted_total: u64,
    pub async_jobs_succeeded_total: u64,
    pub async_jobs_failed_total: u64,
    pub endpoints: HashMap<String, EndpointSnapshot>,
}

#[derive(Debug, Default)]
struct Counters {
    requests_total: u64,
    errors_total: u64,
    async_jobs_submitted_total: u64,
    async_jobs_succeeded_total: u64,
    async_jobs_failed_total: u64,
    endpoints: HashMap<String, EndpointCounters>,
}

/// Process-wide metrics, shared through [`crate::state::AppState`].
#[derive(Default)]
pub struct MetricsRegistry {
    counters: Mutex<Counters>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Records one completed HTTP request under `"METHOD /path"`.
    pub fn record_request(&self, method: &str, path: &str, is_error: bool, latency_ms: f64) {
        let mut counters = self.counters.lock();
        counters.requests_total += 1;
        if is_error {
            counters.errors_total += 1;
        }
        let key = format!("{method} {path}");
        let entry = counters.endpoints.entry(key).or_default();
        entry.count += 1;
        if is_error {
            entry.error_count += 1;
        }
        entry.latency_ms_sum += latency_ms;
    }

    pub fn record_job_submitted(&self) {
        self.counters.lock().async_jobs_submitted_total += 1;
    }

    pub fn record_job_succeeded(&self) {
        self.counters.lock().async_jobs_succeeded_total += 1;
    }

    pub fn record_job_failed(&self) {
        self.counters.lock().async_jobs_failed_total += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.lock();
        let endpoints = counters
            .endpoints
            .iter()
            .map(|(key, value)| {
                let latency_ms_avg = if value.count == 0 { 0.0 } else { value.latency_ms_sum / value.count as f64 };
                (
                    key.clone(),
                    EndpointSnapshot {
                        count: value.count,
                        error_count: value.error_count,
                        latency_ms_sum: value.latency_ms_sum,
                        latency_ms_avg,
                    },
                )
            })
            .collect();
        MetricsSnapshot {
            requests_total: counters.requests_total,
            errors_total: counters.errors_total,
            async_jobs_submitted_total: counters.async_jobs_submitted_total,
            async_jobs_succeeded_total: counters.async_jobs_succeeded_total,
            async_jobs_failed_total: counters.async_jobs_failed_total,
            endpoints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_requests_and_errors_per_endpoint() {
        let metrics = MetricsRegistry::new();
        metrics.record_request("GET", "/v1/agents/jobs/:id", false, 10.0);
        metrics.record_request("GET", "/v1/agents/jobs/:id", true, 20.0);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.errors_total, 1);
        let endpoint = &snapshot.endpoints["GET /v1/agents/jobs/:id"];
        assert_eq!(endpoint.count, 2);
        assert_eq!(endpoint.error_count, 1);
        assert_eq!(endpoint.latency_ms_avg, 15.0);
    }

    #[test]
    fn job_counters_are_independent_of_request_counters() {
        let metrics = MetricsRegistry::new();
        metrics.record_job_submitted();
        metrics.record_job_succeeded();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.async_jobs_submitted_total, 1);
        assert_eq!(snapshot.async_jobs_succeeded_total, 1);
        assert_eq!(snapshot.requests_total, 0);
    }
}
