//! HTTP bridge to an externally hosted runtime (spec section 4.2), with a per-call
//! deadline, bounded exponential-backoff retry, and a consecutive-failure circuit breaker.
//!
//! The circuit breaker is a rolling counter, not a token bucket: any single success
//! resets it to zero, and once `failure_threshold` consecutive calls fail the breaker
//! opens and every call for the next `reset_after` short-circuits with
//! [`ForgeError::CircuitOpen`] *without* touching the underlying HTTP client.

use async_trait::async_trait;
use flowforge_core::config::Settings;
use flowforge_core::error::{ForgeError, Result};
use flowforge_core::models::{CaseExecution, SyntheticCase, ToolSpec, WorkflowBlueprint};
use flowforge_core::protocols::RuntimeAdapter;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;

use crate::manifest::render_workflow_yaml;

struct CircuitState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct ExternalExecutor {
    client: reqwest::Client,
    base_url: String,
    call_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    failure_threshold: u32,
    reset_after: Duration,
    circuit: Mutex<CircuitState>,
}

impl ExternalExecutor {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ForgeError::Configuration(format!("failed to build executor http client: {e}")))?;
        Ok(ExternalExecutor {
            client,
            base_url: settings.executor_external_url.trim_end_matches('/').to_string(),
            call_timeout: settings.executor_timeout,
            max_retries: settings.executor_max_retries,
            retry_backoff: settings.executor_retry_backoff,
            failure_threshold: settings.executor_circuit_failure_threshold,
            reset_after: settings.executor_circuit_reset,
            circuit: Mutex::new(CircuitState { consecutive_failures: 0, opened_at: None }),
        })
    }

    /// Closes the circuit if `reset_after` has elapsed, otherwise rejects the call without
    /// invoking the underlying client.
    fn admit(&self) -> Result<()> {
        let mut state = self.circuit.lock();
        if let Some(opened_at) = state.opened_at {
            if opened_at.elapsed() >= self.reset_after {
                state.opened_at = None;
                state.consecutive_failures = 0;
            } else {
                let remaining = self.reset_after.saturating_sub(opened_at.elapsed());
                tracing::warn!(remaining_secs = remaining.as_secs_f64(), "executor circuit open, short-circuiting call");
                return Err(ForgeError::CircuitOpen(format!(
                    "executor circuit open, retry in {:.1}s",
                    remaining.as_secs_f64()
                )));
            }
        }
        Ok(())
    }

    fn record_success(&self) {
        let mut state = self.circuit.lock();
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    fn record_failure(&self) {
        let mut state = self.circuit.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold && state.opened_at.is_none() {
            tracing::warn!(consecutive_failures = state.consecutive_failures, "executor circuit breaker tripped");
            state.opened_at = Some(Instant::now());
        }
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.retry_backoff.as_millis().max(1) as u64).take(self.max_retries as usize)
    }

    async fn send<T: DeserializeOwned>(&self, build: impl Fn() -> reqwest::RequestBuilder) -> Result<T> {
        self.admit()?;
        let timeout = self.call_timeout;
        let url_for_errors = self.base_url.clone();

        let attempt = || async {
            let request = build();
            let response = tokio::time::timeout(timeout, request.send())
                .await
                .map_err(|_| ForgeError::Runtime(format!("executor call to {url_for_errors} timed out")))?
                .map_err(|e| ForgeError::Runtime(format!("executor call to {url_for_errors} failed: {e}")))?;
            if !response.status().is_success() {
                return Err(ForgeError::Runtime(format!("executor returned status {}", response.status())));
            }
            response
                .json::<T>()
                .await
                .map_err(|e| ForgeError::Runtime(format!("executor response decode failed: {e}")))
        };

        let result = Retry::spawn(self.backoff(), attempt).await;
        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct ExecuteCaseResponse {
    output: String,
    #[serde(default)]
    latency_ms: f64,
    #[serde(default)]
    token_cost: f64,
}

/// Distinguishes why a single case's execution attempt failed, so `execute_case` can label
/// the resulting `RUNTIME_ERROR[...]` output without collapsing timeout into a generic failure.
enum CaseFailure {
    Timeout,
    ExecutionError,
}

impl ExternalExecutor {
    fn runtime_error_case(case: &SyntheticCase, label: &str) -> CaseExecution {
        CaseExecution {
            case_id: case.case_id.clone(),
            question: case.question.clone(),
            expected: case.verifier.clone(),
            output: label.to_string(),
            score: 0.0,
            rationale: String::new(),
            latency_ms: 0.0,
            token_cost: 0.0,
            confidence: 0.0,
            judge_votes: Vec::new(),
        }
    }
}

#[async_trait]
impl RuntimeAdapter for ExternalExecutor {
    async fn fetch_schema_snapshot(&self) -> Result<HashMap<String, serde_json::Value>> {
        let url = format!("{}/schema", self.base_url);
        self.send(|| self.client.get(&url)).await
    }

    async fn fetch_tool_catalog(&self) -> Result<Vec<ToolSpec>> {
        let url = format!("{}/tools", self.base_url);
        self.send(|| self.client.get(&url)).await
    }

    /// Never returns `Err`: a failed execution (timeout, HTTP/decode failure, or an open
    /// circuit) is classified into a `RUNTIME_ERROR[...]` case with `score=0` instead of
    /// aborting the caller's evaluation loop, so one bad case doesn't sink the whole split.
    async fn execute_case(&self, blueprint: &WorkflowBlueprint, case: &SyntheticCase) -> Result<CaseExecution> {
        if self.admit().is_err() {
            return Ok(Self::runtime_error_case(case, "RUNTIME_ERROR[CIRCUIT_OPEN]"));
        }

        let url = format!("{}/execute", self.base_url);
        let payload = serde_json::json!({"blueprint": blueprint, "case": case});
        let timeout = self.call_timeout;

        let attempt = || async {
            let response = tokio::time::timeout(timeout, self.client.post(&url).json(&payload).send())
                .await
                .map_err(|_| CaseFailure::Timeout)?
                .map_err(|_| CaseFailure::ExecutionError)?;
            if !response.status().is_success() {
                return Err(CaseFailure::ExecutionError);
            }
            response.json::<ExecuteCaseResponse>().await.map_err(|_| CaseFailure::ExecutionError)
        };

        match Retry::spawn(self.backoff(), attempt).await {
            Ok(response) => {
                self.record_success();
                Ok(CaseExecution {
                    case_id: case.case_id.clone(),
                    question: case.question.clone(),
                    expected: case.verifier.clone(),
                    output: response.output,
                    score: 0.0,
                    rationale: String::new(),
                    latency_ms: response.latency_ms,
                    token_cost: response.token_cost,
                    confidence: 0.0,
                    judge_votes: Vec::new(),
                })
            }
            Err(failure) => {
                self.record_failure();
                let label = match failure {
                    CaseFailure::Timeout => "RUNTIME_ERROR[TIMEOUT]",
                    CaseFailure::ExecutionError => "RUNTIME_ERROR[EXECUTION_ERROR]",
                };
                Ok(Self::runtime_error_case(case, label))
            }
        }
    }

    async fn materialize(&self, blueprint: &WorkflowBlueprint, output_dir: &Path) -> Result<PathBuf> {
        let yaml = render_workflow_yaml(blueprint)?;
        let path = output_dir.join("workflow.yml");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ForgeError::Io)?;
        }
        tokio::fs::write(&path, yaml).await.map_err(ForgeError::Io)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(failure_threshold: u32) -> Settings {
        let mut settings = Settings::default();
        settings.executor_external_url = "http://127.0.0.1:1".to_string();
        settings.executor_timeout = Duration::from_millis(50);
        settings.executor_max_retries = 0;
        settings.executor_retry_backoff = Duration::from_millis(1);
        settings.executor_circuit_failure_threshold = failure_threshold;
        settings.executor_circuit_reset = Duration::from_millis(200);
        settings
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_consecutive_failures_and_short_circuits() {
        let executor = ExternalExecutor::new(&settings_with(2)).unwrap();
        let bp = WorkflowBlueprint {
            blueprint_id: "bp".to_string(),
            app_name: "demo".to_string(),
            task_desc: "t".to_string(),
            topology: flowforge_core::enums::TopologyPattern::Linear,
            tools: vec![],
            actions: vec![],
            experts: vec![],
            leader_actions: vec![],
            parent_id: None,
            mutation_trace: vec![],
            metadata: HashMap::new(),
        };
        let case = SyntheticCase {
            case_id: "c1".to_string(),
            question: "q".to_string(),
            verifier: "v".to_string(),
            intent: flowforge_core::enums::TaskIntent::Query,
            difficulty: flowforge_core::enums::Difficulty::L1,
            metadata: HashMap::new(),
        };

        let first = executor.execute_case(&bp, &case).await.unwrap();
        assert_eq!(first.output, "RUNTIME_ERROR[EXECUTION_ERROR]");
        assert_eq!(first.score, 0.0);
        let second = executor.execute_case(&bp, &case).await.unwrap();
        assert_eq!(second.output, "RUNTIME_ERROR[EXECUTION_ERROR]");

        let third = executor.execute_case(&bp, &case).await.unwrap();
        assert_eq!(third.output, "RUNTIME_ERROR[CIRCUIT_OPEN]");
    }

    #[tokio::test]
    async fn materialize_does_not_touch_the_network() {
        let executor = ExternalExecutor::new(&settings_with(5)).unwrap();
        let bp = WorkflowBlueprint {
            blueprint_id: "bp".to_string(),
            app_name: "demo".to_string(),
            task_desc: "t".to_string(),
            topology: flowforge_core::enums::TopologyPattern::Linear,
            tools: vec![],
            actions: vec![],
            experts: vec![],
            leader_actions: vec![],
            parent_id: None,
            mutation_trace: vec![],
            metadata: HashMap::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = executor.materialize(&bp, dir.path()).await.unwrap();
        assert!(path.exists());
    }
}
