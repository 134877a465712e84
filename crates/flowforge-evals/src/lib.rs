//! Judge ensemble, reflective evaluation, and failure taxonomy classification.

pub mod evaluator;
pub mod failure_taxonomy;
pub mod judge;

pub use evaluator::ReflectionWorkflowEvaluator;
pub use failure_taxonomy::{
    build_failure_taxonomy, classify_failure_case, classify_failure_severity, FailureCaseItem,
    FailureTaxonomy, FailureTaxonomyRules, FAILURE_CATEGORIES, FAILURE_SEVERITIES,
};
pub use judge::{default_judge_ensemble, EnsembleJudge, HeuristicJudge, RuleBasedJudge, WeightedJudge};
