//! Closed value sets shared by the domain model and the search engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The inferred intent behind a synthetic case or a task description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskIntent {
    Query,
    Analytics,
    Modeling,
    Import,
    Qa,
}

impl TaskIntent {
    pub const ALL: [TaskIntent; 5] = [
        TaskIntent::Query,
        TaskIntent::Analytics,
        TaskIntent::Modeling,
        TaskIntent::Import,
        TaskIntent::Qa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskIntent::Query => "query",
            TaskIntent::Analytics => "analytics",
            TaskIntent::Modeling => "modeling",
            TaskIntent::Import => "import",
            TaskIntent::Qa => "qa",
        }
    }
}

impl fmt::Display for TaskIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty band cycled over synthesized cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    L1,
    L2,
    L3,
    L4,
}

impl Difficulty {
    pub const CYCLE: [Difficulty; 4] = [Difficulty::L1, Difficulty::L2, Difficulty::L3, Difficulty::L4];
}

/// Orchestration topology a blueprint's experts are organized under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyPattern {
    Linear,
    PlannerWorkerReviewer,
    RouterParallel,
}

impl TopologyPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyPattern::Linear => "linear",
            TopologyPattern::PlannerWorkerReviewer => "planner_worker_reviewer",
            TopologyPattern::RouterParallel => "router_parallel",
        }
    }

    /// The next topology in the mutation cycle LINEAR -> PWR -> ROUTER -> LINEAR.
    pub fn next(&self) -> TopologyPattern {
        match self {
            TopologyPattern::Linear => TopologyPattern::PlannerWorkerReviewer,
            TopologyPattern::PlannerWorkerReviewer => TopologyPattern::RouterParallel,
            TopologyPattern::RouterParallel => TopologyPattern::Linear,
        }
    }

    /// Novelty bonus used by the search engine's selection rule (spec 4.7).
    pub fn novelty_bonus(&self) -> f64 {
        match self {
            TopologyPattern::Linear => 0.1,
            TopologyPattern::PlannerWorkerReviewer => 0.4,
            TopologyPattern::RouterParallel => 0.6,
        }
    }

    pub fn from_str_lenient(value: &str) -> TopologyPattern {
        match value {
            "linear" => TopologyPattern::Linear,
            "router_parallel" => TopologyPattern::RouterParallel,
            "planner_worker_reviewer" => TopologyPattern::PlannerWorkerReviewer,
            _ => TopologyPattern::PlannerWorkerReviewer,
        }
    }
}

impl fmt::Display for TopologyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stage of a persisted agent version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentLifecycle {
    Draft,
    Validated,
    Deployed,
    Archived,
}

impl fmt::Display for AgentLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentLifecycle::Draft => "draft",
            AgentLifecycle::Validated => "validated",
            AgentLifecycle::Deployed => "deployed",
            AgentLifecycle::Archived => "archived",
        };
        f.write_str(s)
    }
}

/// Named knob configuration, selecting which mutations/augmentations are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentProfile {
    FullSystem,
    IdeaFailureAwareMutation,
    BaselineStaticPromptOnly,
    DynamicPromptOnly,
    DynamicPromptTool,
    AblationNoHoldout,
    AblationSingleJudge,
    AblationNoHardNegative,
    AblationNoToolGain,
    AblationNoTopologyMutation,
}

impl ExperimentProfile {
    /// Parses a profile tag, falling back to `FullSystem` for anything unrecognized
    /// rather than failing the request (spec 4.8: "Unknown profile -> defaults of full_system").
    pub fn parse_lenient(value: &str) -> ExperimentProfile {
        match value {
            "idea_failure_aware_mutation" => ExperimentProfile::IdeaFailureAwareMutation,
            "baseline_static_prompt_only" => ExperimentProfile::BaselineStaticPromptOnly,
            "dynamic_prompt_only" => ExperimentProfile::DynamicPromptOnly,
            "dynamic_prompt_tool" => ExperimentProfile::DynamicPromptTool,
            "ablation_no_holdout" => ExperimentProfile::AblationNoHoldout,
            "ablation_single_judge" => ExperimentProfile::AblationSingleJudge,
            "ablation_no_hard_negative" => ExperimentProfile::AblationNoHardNegative,
            "ablation_no_tool_gain" => ExperimentProfile::AblationNoToolGain,
            "ablation_no_topology_mutation" => ExperimentProfile::AblationNoTopologyMutation,
            "full_system" => ExperimentProfile::FullSystem,
            _ => ExperimentProfile::FullSystem,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentProfile::FullSystem => "full_system",
            ExperimentProfile::IdeaFailureAwareMutation => "idea_failure_aware_mutation",
            ExperimentProfile::BaselineStaticPromptOnly => "baseline_static_prompt_only",
            ExperimentProfile::DynamicPromptOnly => "dynamic_prompt_only",
            ExperimentProfile::DynamicPromptTool => "dynamic_prompt_tool",
            ExperimentProfile::AblationNoHoldout => "ablation_no_holdout",
            ExperimentProfile::AblationSingleJudge => "ablation_single_judge",
            ExperimentProfile::AblationNoHardNegative => "ablation_no_hard_negative",
            ExperimentProfile::AblationNoToolGain => "ablation_no_tool_gain",
            ExperimentProfile::AblationNoTopologyMutation => "ablation_no_topology_mutation",
        }
    }
}

impl fmt::Display for ExperimentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue/async-job lifecycle (C13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// Kind of async job the queue can run (C13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Optimize,
    ManualParity,
}

/// Dataset partition a case belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        };
        f.write_str(s)
    }
}
