//! Narrow trait interfaces at the polymorphic seams of the system (spec section 9).
//!
//! Each trait corresponds to one protocol in the original design: a runtime adapter, a
//! dataset synthesizer, a prompt optimizer, a tool selector, an LLM judge, and a workflow
//! evaluator. Implementations live in downstream crates; this crate only fixes the contract.

use crate::error::Result;
use crate::models::{CaseExecution, EvaluationSummary, SyntheticCase, SyntheticDataset, ToolSpec, WorkflowBlueprint};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

/// Bridges a blueprint to whatever system actually executes it (C2).
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// A snapshot of the schema (labels/relations) the dataset synthesizer renders
    /// questions against.
    async fn fetch_schema_snapshot(&self) -> Result<HashMap<String, serde_json::Value>>;

    /// The tools this runtime currently exposes.
    async fn fetch_tool_catalog(&self) -> Result<Vec<ToolSpec>>;

    /// Runs one case against one blueprint and returns the raw execution. The executor
    /// never scores the output itself (`score` is always 0 on return) — scoring is the
    /// judge's job (spec 4.2).
    async fn execute_case(&self, blueprint: &WorkflowBlueprint, case: &SyntheticCase) -> Result<CaseExecution>;

    /// Materializes a blueprint to its on-disk runtime representation (the YAML manifest)
    /// under `output_dir`, returning the path written.
    async fn materialize(&self, blueprint: &WorkflowBlueprint, output_dir: &Path) -> Result<std::path::PathBuf>;
}

/// Generates a size-bounded, schema-aware evaluation dataset (C4).
#[async_trait]
pub trait DatasetSynthesizer: Send + Sync {
    async fn synthesize(&self, task_desc: &str, dataset_name: &str, size: usize) -> Result<SyntheticDataset>;
}

/// Produces an improved prompt from a parent prompt and the cases it failed on (C6).
#[async_trait]
pub trait PromptOptimizer: Send + Sync {
    async fn optimize(&self, prompt: &str, failures: &[CaseExecution], task_desc: &str) -> Result<String>;
}

/// Ranks a tool catalog against inferred task intents (C5).
pub trait ToolSelector: Send + Sync {
    fn rank(
        &self,
        task_desc: &str,
        intents: &[crate::enums::TaskIntent],
        catalog: &[ToolSpec],
        top_k: usize,
        historical_gain: Option<&HashMap<String, f64>>,
    ) -> Vec<ToolSpec>;
}

/// Scores a single (question, expected, prediction) triple (C3).
///
/// Implementations that aggregate multiple judges (the [ensemble][crate] pattern) may
/// additionally expose `last_votes`/`last_agreement`/`last_confidence` through their own
/// inherent methods; the trait itself only fixes the scoring contract.
#[async_trait]
pub trait LlmJudge: Send + Sync {
    async fn judge(&self, question: &str, expected: &str, prediction: &str, rubric: &str) -> Result<(f64, String)>;

    /// Per-judge votes from the most recent call, when this judge is an ensemble. Single
    /// judges leave the default empty implementation.
    fn last_votes(&self) -> Vec<crate::models::JudgeVote> {
        Vec::new()
    }

    /// Inter-judge agreement from the most recent call, in `[0, 1]`. Defaults to full
    /// agreement for a single judge.
    fn last_agreement(&self) -> Option<f64> {
        None
    }

    /// Blended score/agreement confidence from the most recent call, in `[0, 1]`.
    fn last_confidence(&self) -> Option<f64> {
        None
    }
}

/// Runs an executor and judge over a case list and aggregates the result (C7).
#[async_trait]
pub trait WorkflowEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        blueprint: &WorkflowBlueprint,
        cases: &[SyntheticCase],
        split: crate::enums::Split,
    ) -> Result<EvaluationSummary>;
}
