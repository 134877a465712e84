//! Immutable value types for the optimization domain (spec component C1).

use crate::enums::{AgentLifecycle, Difficulty, JobStatus, JobType, Split, TaskIntent, TopologyPattern};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tool an executor makes available to a blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub module_path: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_tool_type")]
    pub tool_type: String,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// A named grouping of tools a blueprint's operators can invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools: Vec<String>,
}

/// One step of an expert's workflow: an instruction plus the actions it may use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    pub instruction: String,
    #[serde(default)]
    pub output_schema: HashMap<String, String>,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// An ordered sequence of operators executing under one topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expert {
    pub name: String,
    pub operators: Vec<Operator>,
}

/// The optimization subject: prompts, tool bindings, and orchestration topology.
///
/// Invariants (enforced by [`WorkflowBlueprint::validate`]): every action referenced by an
/// operator or by `leader_actions` exists in `actions`; every tool referenced by an action
/// exists in `tools`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowBlueprint {
    pub blueprint_id: String,
    pub app_name: String,
    pub task_desc: String,
    pub topology: TopologyPattern,
    pub tools: Vec<ToolSpec>,
    pub actions: Vec<Action>,
    pub experts: Vec<Expert>,
    pub leader_actions: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub mutation_trace: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WorkflowBlueprint {
    pub fn action_names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name.clone()).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    /// Total number of operators across every expert, used by the complexity penalty.
    pub fn operator_count(&self) -> usize {
        self.experts.iter().map(|e| e.operators.len()).sum()
    }

    pub fn validate(&self) -> Result<(), String> {
        let action_names: std::collections::HashSet<&str> =
            self.actions.iter().map(|a| a.name.as_str()).collect();
        let tool_names: std::collections::HashSet<&str> =
            self.tools.iter().map(|t| t.name.as_str()).collect();

        for action in &self.leader_actions {
            if !action_names.contains(action.as_str()) {
                return Err(format!("leader action '{action}' not present in actions[]"));
            }
        }
        for expert in &self.experts {
            for operator in &expert.operators {
                for action in &operator.actions {
                    if !action_names.contains(action.as_str()) {
                        return Err(format!(
                            "operator '{}' references unknown action '{action}'",
                            operator.name
                        ));
                    }
                }
            }
        }
        for action in &self.actions {
            for tool in &action.tools {
                if !tool_names.contains(tool.as_str()) {
                    return Err(format!(
                        "action '{}' references unknown tool '{tool}'",
                        action.name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Lineage metadata attached to a synthesized case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseLineage {
    pub seed_index: usize,
    pub intent: TaskIntent,
    pub difficulty: Difficulty,
    pub is_hard_negative: bool,
}

/// A single synthetic task item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticCase {
    pub case_id: String,
    pub question: String,
    pub verifier: String,
    pub intent: TaskIntent,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SyntheticCase {
    pub fn is_hard_negative(&self) -> bool {
        self.metadata
            .get("lineage")
            .and_then(|v| v.get("is_hard_negative"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Bookkeeping about how a dataset was synthesized, persisted as `dataset_report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisReport {
    pub requested_size: usize,
    pub final_size: usize,
    pub intents: Vec<TaskIntent>,
    pub labels: Vec<String>,
    pub relations: Vec<String>,
    pub hard_negative_count: usize,
    pub split_sizes: SplitSizes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

/// A synthesized evaluation dataset with its train/val/test partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticDataset {
    pub name: String,
    pub task_desc: String,
    pub cases: Vec<SyntheticCase>,
    pub train_cases: Vec<SyntheticCase>,
    pub val_cases: Vec<SyntheticCase>,
    pub test_cases: Vec<SyntheticCase>,
    pub schema_snapshot: HashMap<String, serde_json::Value>,
    pub synthesis_report: SynthesisReport,
}

/// A named prompt candidate kept in a [`crate`]-external variant registry, scored by how
/// well it performed the round it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVariant {
    pub variant_id: String,
    pub prompt: String,
    pub source: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One judge's vote on a case execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVote {
    pub judge_name: String,
    pub score: f64,
    pub rationale: String,
}

/// The result of running one blueprint against one case through the executor and judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseExecution {
    pub case_id: String,
    pub question: String,
    pub expected: String,
    pub output: String,
    pub score: f64,
    pub rationale: String,
    pub latency_ms: f64,
    pub token_cost: f64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub judge_votes: Vec<JudgeVote>,
}

/// Aggregate evaluation of a blueprint over a case list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub blueprint_id: String,
    pub mean_score: f64,
    pub mean_latency_ms: f64,
    pub mean_token_cost: f64,
    pub total_cases: usize,
    pub reflection: String,
    #[serde(default = "default_agreement")]
    pub judge_agreement: f64,
    #[serde(default)]
    pub score_std: f64,
    pub split: Split,
    pub case_results: Vec<CaseExecution>,
}

fn default_agreement() -> f64 {
    1.0
}

impl EvaluationSummary {
    pub fn mean_confidence(&self) -> f64 {
        if self.case_results.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.case_results.iter().map(|c| c.confidence).sum();
        sum / self.case_results.len() as f64
    }
}

/// An ephemeral node in the search tree (not persisted beyond a run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchNode {
    pub node_id: String,
    pub blueprint: WorkflowBlueprint,
    pub parent_id: Option<String>,
    pub visits: u64,
    pub value_sum: f64,
    pub best_score: f64,
    pub last_reflection: String,
    pub children_ids: Vec<String>,
}

impl SearchNode {
    pub fn mean_value(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.value_sum / self.visits as f64
        }
    }
}

/// One row of the search engine's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRoundTrace {
    pub round_num: u32,
    pub selected_node_id: String,
    pub selected_blueprint_id: String,
    pub mutation: String,
    pub train_objective: f64,
    pub val_objective: f64,
    pub best_train_objective: f64,
    pub best_val_objective: f64,
    pub improvement: f64,
    pub regret: f64,
    pub uncertainty: f64,
    pub generalization_gap: f64,
}

/// A persisted version of an agent's workflow blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentVersionRecord {
    pub agent_name: String,
    pub version: u32,
    pub lifecycle: AgentLifecycle,
    pub blueprint_id: String,
    pub score: f64,
    pub artifact_path: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub notes: String,
}

/// One entry in a run's content-addressed artifact index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactIndexEntry {
    pub artifact_type: String,
    pub uri: String,
    pub checksum: String,
    pub size_bytes: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A completed end-to-end optimize() invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRun {
    pub run_id: String,
    pub agent_name: String,
    pub task_desc: String,
    pub artifact_dir: String,
    pub best_blueprint_id: String,
    pub best_train_score: f64,
    pub best_val_score: Option<f64>,
    pub best_test_score: Option<f64>,
    pub round_traces: Vec<SearchRoundTrace>,
    pub artifact_index: Vec<ArtifactIndexEntry>,
}

/// An async job's lifecycle record (C13).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncJobRecord {
    pub job_id: String,
    pub job_type: JobType,
    pub tenant_id: String,
    pub agent_name: String,
    pub status: JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Idempotency-key bookkeeping state for one (scope, key) pair (C14).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IdempotencyStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub status: IdempotencyStatus,
    pub response: Option<serde_json::Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint_with_action(action: &str, tool: &str) -> WorkflowBlueprint {
        WorkflowBlueprint {
            blueprint_id: "bp-test".into(),
            app_name: "demo".into(),
            task_desc: "task".into(),
            topology: TopologyPattern::Linear,
            tools: vec![ToolSpec {
                name: tool.into(),
                module_path: "mod".into(),
                description: "d".into(),
                tags: vec![],
                tool_type: "function".into(),
            }],
            actions: vec![Action {
                name: action.into(),
                description: String::new(),
                tools: vec![tool.into()],
            }],
            experts: vec![Expert {
                name: "GraphTaskExpert".into(),
                operators: vec![Operator {
                    name: "linear_worker".into(),
                    instruction: "do it".into(),
                    output_schema: HashMap::new(),
                    actions: vec![action.into()],
                }],
            }],
            leader_actions: vec![action.into()],
            parent_id: None,
            mutation_trace: vec![],
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn validate_accepts_consistent_blueprint() {
        let bp = blueprint_with_action("use_cypherexecutor", "CypherExecutor");
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn validate_rejects_dangling_action_reference() {
        let mut bp = blueprint_with_action("use_cypherexecutor", "CypherExecutor");
        bp.leader_actions.push("use_missing".into());
        assert!(bp.validate().is_err());
    }

    #[test]
    fn validate_rejects_dangling_tool_reference() {
        let mut bp = blueprint_with_action("use_cypherexecutor", "CypherExecutor");
        bp.actions[0].tools.push("GhostTool".into());
        assert!(bp.validate().is_err());
    }

    #[test]
    fn mean_value_is_zero_for_unvisited_node() {
        let node = SearchNode {
            node_id: "node-1".into(),
            blueprint: blueprint_with_action("a", "t"),
            parent_id: None,
            visits: 0,
            value_sum: 0.0,
            best_score: 0.0,
            last_reflection: String::new(),
            children_ids: vec![],
        };
        assert_eq!(node.mean_value(), 0.0);
    }
}
