//! Environment-driven process configuration (spec section 4.18, ambient).

use crate::error::ForgeError;
use std::env;
use std::time::Duration;

/// Executor runtime mode: deterministic mock, or a bridge to an external runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    Mock,
    External,
}

/// Judge backend: deterministic rule/heuristic ensemble, or one backed by an LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeBackend {
    Mock,
    Llm,
}

/// Artifact store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStoreBackend {
    Local,
    Memory,
}

/// Process-wide settings, built once at startup from the environment.
///
/// Mirrors the field set of the original `Settings` object closely (see DESIGN.md), with two
/// renames: `chat2graph_runtime_mode` -> `executor_runtime_mode`, and database-specific fields
/// collapsed into a single `database_url` used by the relational repository backend.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub executor_runtime_mode: RuntimeMode,
    pub executor_external_url: String,
    pub executor_timeout: Duration,
    pub executor_max_retries: u32,
    pub executor_retry_backoff: Duration,
    pub executor_circuit_failure_threshold: u32,
    pub executor_circuit_reset: Duration,
    pub judge_backend: JudgeBackend,
    pub judge_model: String,
    pub auth_enabled: bool,
    pub auth_api_keys_json: String,
    pub auth_jwt_keys_json: String,
    pub auth_jwt_issuer: Option<String>,
    pub auth_jwt_audience: Option<String>,
    pub auth_jwt_clock_skew: Duration,
    pub auth_default_tenant_id: String,
    pub default_dataset_size: usize,
    pub max_search_rounds: u32,
    pub max_expansions_per_round: u32,
    pub max_prompt_candidates: usize,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub test_ratio: f64,
    pub artifacts_dir: String,
    pub manual_blueprints_dir: String,
    pub artifact_store_backend: ArtifactStoreBackend,
    pub http_bind_addr: String,
    pub http_body_limit_bytes: usize,
    pub job_queue_workers: usize,
}

impl Settings {
    /// Builds settings from the environment, validating ranges. Never panics; an invalid
    /// environment produces a `ForgeError::Configuration` the caller surfaces and exits on.
    pub fn from_env() -> Result<Self, ForgeError> {
        let settings = Settings {
            database_url: env_or("DATABASE_URL", "sqlite://flowforge.db"),
            executor_runtime_mode: parse_runtime_mode(&env_or("EXECUTOR_RUNTIME_MODE", "mock"))?,
            executor_external_url: env_or("EXECUTOR_EXTERNAL_URL", "http://127.0.0.1:8090"),
            executor_timeout: Duration::from_secs_f64(env_parse_or("EXECUTOR_TIMEOUT_SECONDS", 30.0)?),
            executor_max_retries: env_parse_or("EXECUTOR_MAX_RETRIES", 2)?,
            executor_retry_backoff: Duration::from_secs_f64(env_parse_or(
                "EXECUTOR_RETRY_BACKOFF_SECONDS",
                0.5,
            )?),
            executor_circuit_failure_threshold: env_parse_or("EXECUTOR_CIRCUIT_FAILURE_THRESHOLD", 5)?,
            executor_circuit_reset: Duration::from_secs_f64(env_parse_or(
                "EXECUTOR_CIRCUIT_RESET_SECONDS",
                30.0,
            )?),
            judge_backend: parse_judge_backend(&env_or("JUDGE_BACKEND", "mock"))?,
            judge_model: env_or("JUDGE_MODEL", "gpt-4.1-mini"),
            auth_enabled: env_parse_or("AUTH_ENABLED", false)?,
            auth_api_keys_json: env_or("AUTH_API_KEYS_JSON", "{}"),
            auth_jwt_keys_json: env_or("AUTH_JWT_KEYS_JSON", "{}"),
            auth_jwt_issuer: env::var("AUTH_JWT_ISSUER").ok(),
            auth_jwt_audience: env::var("AUTH_JWT_AUDIENCE").ok(),
            auth_jwt_clock_skew: Duration::from_secs(env_parse_or("AUTH_JWT_CLOCK_SKEW_SECONDS", 30)?),
            auth_default_tenant_id: env_or("AUTH_DEFAULT_TENANT_ID", "default"),
            default_dataset_size: env_parse_or("DEFAULT_DATASET_SIZE", 12)?,
            max_search_rounds: env_parse_or("MAX_SEARCH_ROUNDS", 10)?,
            max_expansions_per_round: env_parse_or("MAX_EXPANSIONS_PER_ROUND", 3)?,
            max_prompt_candidates: env_parse_or("MAX_PROMPT_CANDIDATES", 4)?,
            train_ratio: env_parse_or("TRAIN_RATIO", 0.6)?,
            val_ratio: env_parse_or("VAL_RATIO", 0.2)?,
            test_ratio: env_parse_or("TEST_RATIO", 0.2)?,
            artifacts_dir: env_or("ARTIFACTS_DIR", "./artifacts"),
            manual_blueprints_dir: env_or("MANUAL_BLUEPRINTS_DIR", "./artifacts/manual_blueprints"),
            artifact_store_backend: parse_store_backend(&env_or("ARTIFACT_STORE_BACKEND", "local"))?,
            http_bind_addr: env_or("HTTP_BIND_ADDR", "0.0.0.0:8080"),
            http_body_limit_bytes: env_parse_or("HTTP_BODY_LIMIT_BYTES", 2 * 1024 * 1024)?,
            job_queue_workers: env_parse_or("JOB_QUEUE_WORKERS", 2)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ForgeError> {
        let ratio_sum = self.train_ratio + self.val_ratio + self.test_ratio;
        if (ratio_sum - 1.0).abs() > 1e-6 {
            return Err(ForgeError::Configuration(format!(
                "train/val/test ratios must sum to 1.0, got {ratio_sum}"
            )));
        }
        if !(6..=30).contains(&self.default_dataset_size) {
            return Err(ForgeError::Configuration(
                "DEFAULT_DATASET_SIZE must be in [6, 30]".into(),
            ));
        }
        if self.max_search_rounds == 0 {
            return Err(ForgeError::Configuration("MAX_SEARCH_ROUNDS must be >= 1".into()));
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ForgeError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ForgeError::Configuration(format!("invalid value for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

fn parse_runtime_mode(value: &str) -> Result<RuntimeMode, ForgeError> {
    match value {
        "mock" => Ok(RuntimeMode::Mock),
        "external" => Ok(RuntimeMode::External),
        other => Err(ForgeError::Configuration(format!(
            "invalid EXECUTOR_RUNTIME_MODE: {other}"
        ))),
    }
}

fn parse_judge_backend(value: &str) -> Result<JudgeBackend, ForgeError> {
    match value {
        "mock" => Ok(JudgeBackend::Mock),
        "llm" => Ok(JudgeBackend::Llm),
        other => Err(ForgeError::Configuration(format!("invalid JUDGE_BACKEND: {other}"))),
    }
}

fn parse_store_backend(value: &str) -> Result<ArtifactStoreBackend, ForgeError> {
    match value {
        "local" => Ok(ArtifactStoreBackend::Local),
        "memory" => Ok(ArtifactStoreBackend::Memory),
        other => Err(ForgeError::Configuration(format!(
            "invalid ARTIFACT_STORE_BACKEND: {other}"
        ))),
    }
}

impl Default for Settings {
    /// A settings value usable directly in tests; never touches the environment.
    fn default() -> Self {
        Settings {
            database_url: "sqlite://:memory:".to_string(),
            executor_runtime_mode: RuntimeMode::Mock,
            executor_external_url: "http://127.0.0.1:8090".to_string(),
            executor_timeout: Duration::from_secs_f64(30.0),
            executor_max_retries: 2,
            executor_retry_backoff: Duration::from_secs_f64(0.5),
            executor_circuit_failure_threshold: 5,
            executor_circuit_reset: Duration::from_secs_f64(30.0),
            judge_backend: JudgeBackend::Mock,
            judge_model: "gpt-4.1-mini".to_string(),
            auth_enabled: false,
            auth_api_keys_json: "{}".to_string(),
            auth_jwt_keys_json: "{}".to_string(),
            auth_jwt_issuer: None,
            auth_jwt_audience: None,
            auth_jwt_clock_skew: Duration::from_secs(30),
            auth_default_tenant_id: "default".to_string(),
            default_dataset_size: 12,
            max_search_rounds: 10,
            max_expansions_per_round: 3,
            max_prompt_candidates: 4,
            train_ratio: 0.6,
            val_ratio: 0.2,
            test_ratio: 0.2,
            artifacts_dir: "./artifacts".to_string(),
            manual_blueprints_dir: "./artifacts/manual_blueprints".to_string(),
            artifact_store_backend: ArtifactStoreBackend::Memory,
            http_bind_addr: "127.0.0.1:8080".to_string(),
            http_body_limit_bytes: 2 * 1024 * 1024,
            job_queue_workers: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn bad_ratio_sum_is_rejected() {
        let mut settings = Settings::default();
        settings.train_ratio = 0.9;
        assert!(settings.validate().is_err());
    }
}
