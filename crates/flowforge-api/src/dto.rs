//! Request/response bodies for the HTTP transport (spec section 6).

use flowforge_core::enums::{AgentLifecycle, ExperimentProfile, Split};
use flowforge_core::models::{ArtifactIndexEntry, SearchRoundTrace};
use flowforge_evals::FailureTaxonomy;
use serde::{Deserialize, Serialize};

fn default_profile() -> String {
    ExperimentProfile::FullSystem.as_str().to_string()
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub agent_name: String,
    pub task_desc: String,
    #[serde(default)]
    pub dataset_size: Option<usize>,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct OptimizeResponse {
    pub run_id: String,
    pub agent_name: String,
    pub version: u32,
    pub blueprint_id: String,
    pub lifecycle: AgentLifecycle,
    pub best_train_score: f64,
    pub best_val_score: Option<f64>,
    pub best_test_score: Option<f64>,
    pub profile: String,
    pub round_traces: Vec<SearchRoundTrace>,
    pub artifact_index: Vec<ArtifactIndexEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ParityRequest {
    pub agent_name: String,
    pub task_desc: String,
    pub manual_blueprint_path: String,
    #[serde(default)]
    pub dataset_size: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_parity_margin")]
    pub parity_margin: f64,
}

fn default_parity_margin() -> f64 {
    0.05
}

#[derive(Debug, Serialize)]
pub struct ParityResponse {
    pub agent_name: String,
    pub split: Split,
    pub manual_score: f64,
    pub auto_score: f64,
    pub score_gap: f64,
    pub parity_margin: f64,
    pub parity_achieved: bool,
    pub failure_taxonomy: FailureTaxonomy,
}

#[derive(Debug, Serialize)]
pub struct VersionsResponse {
    pub agent_name: String,
    pub versions: Vec<flowforge_core::models::AgentVersionRecord>,
}

#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub agent_name: String,
    pub version: u32,
    pub lifecycle: AgentLifecycle,
}

#[derive(Debug, Serialize)]
pub struct AsyncJobAccepted {
    pub job_id: String,
    pub status: flowforge_core::enums::JobStatus,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub job_type: flowforge_core::enums::JobType,
    pub status: flowforge_core::enums::JobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl From<flowforge_core::models::AsyncJobRecord> for JobResponse {
    fn from(record: flowforge_core::models::AsyncJobRecord) -> Self {
        JobResponse {
            job_id: record.job_id,
            job_type: record.job_type,
            status: record.status,
            result: record.result,
            error: record.error,
        }
    }
}
