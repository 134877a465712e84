//! Domain types, error taxonomy, protocol traits, and process configuration shared by every
//! other crate in the workspace.

pub mod config;
pub mod enums;
pub mod error;
pub mod models;
pub mod protocols;

pub use config::Settings;
pub use enums::{AgentLifecycle, Difficulty, ExperimentProfile, JobStatus, JobType, Split, TaskIntent, TopologyPattern};
pub use error::{ForgeError, Result};
pub use models::{
    Action, AgentVersionRecord, ArtifactIndexEntry, AsyncJobRecord, CaseExecution, CaseLineage,
    EvaluationSummary, Expert, IdempotencyRecord, IdempotencyStatus, JudgeVote, Operator,
    OptimizationRun, PromptVariant, SearchNode, SearchRoundTrace, SplitSizes, SynthesisReport,
    SyntheticCase, SyntheticDataset, ToolSpec, WorkflowBlueprint,
};
pub use protocols::{DatasetSynthesizer, LlmJudge, PromptOptimizer, RuntimeAdapter, ToolSelector, WorkflowEvaluator};
