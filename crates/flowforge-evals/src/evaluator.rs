//! Runs an executor and judge over a case list and aggregates results with reflection (C7).

use async_trait::async_trait;
use flowforge_core::error::Result;
use flowforge_core::{
    CaseExecution, EvaluationSummary, LlmJudge, RuntimeAdapter, Split, SyntheticCase, WorkflowBlueprint,
    WorkflowEvaluator,
};
use std::sync::Arc;

const DEFAULT_RUBRIC: &str =
    "Score by factual correctness, graph-domain precision, and task completion.";
const FAILURE_SCORE_THRESHOLD: f64 = 0.6;
const MAX_REFLECTION_SNIPPETS: usize = 3;

/// Evaluates a blueprint over a case list, then writes a short natural-language reflection
/// the prompt optimizer consumes as the parent of its next candidate prompt.
pub struct ReflectionWorkflowEvaluator {
    runtime: Arc<dyn RuntimeAdapter>,
    judge: Arc<dyn LlmJudge>,
    rubric: String,
}

impl ReflectionWorkflowEvaluator {
    pub fn new(runtime: Arc<dyn RuntimeAdapter>, judge: Arc<dyn LlmJudge>) -> Self {
        ReflectionWorkflowEvaluator { runtime, judge, rubric: DEFAULT_RUBRIC.to_string() }
    }

    pub fn with_rubric(runtime: Arc<dyn RuntimeAdapter>, judge: Arc<dyn LlmJudge>, rubric: String) -> Self {
        ReflectionWorkflowEvaluator { runtime, judge, rubric }
    }

    fn reflect(results: &[CaseExecution], split: Split) -> String {
        let failed: Vec<&CaseExecution> = results.iter().filter(|r| r.score < FAILURE_SCORE_THRESHOLD).collect();
        if failed.is_empty() {
            return format!("{split}: stable candidate, preserve current constraints and evidence discipline");
        }

        let mut snippets: Vec<String> = failed
            .iter()
            .take(MAX_REFLECTION_SNIPPETS)
            .map(|case| {
                format!(
                    "{} score={:.2} confidence={:.2} reason={}",
                    case.case_id, case.score, case.confidence, case.rationale
                )
            })
            .collect();
        snippets.push("Improve prompt grounding, prune noisy tools, and add reviewer checks.".to_string());
        snippets.join(" | ")
    }
}

#[async_trait]
impl WorkflowEvaluator for ReflectionWorkflowEvaluator {
    async fn evaluate(
        &self,
        blueprint: &WorkflowBlueprint,
        cases: &[SyntheticCase],
        split: Split,
    ) -> Result<EvaluationSummary> {
        let mut results = Vec::with_capacity(cases.len());
        let mut agreements = Vec::new();

        for case in cases {
            let mut execution = match self.runtime.execute_case(blueprint, case).await {
                Ok(execution) => execution,
                // Adapters classify timeout/circuit-open/HTTP failures into an `Ok` case with a
                // `RUNTIME_ERROR[...]` output; this only guards an adapter that still surfaces a
                // genuine `Err`, so one bad case doesn't abort evaluation of the whole split.
                Err(err) => CaseExecution {
                    case_id: case.case_id.clone(),
                    question: case.question.clone(),
                    expected: case.verifier.clone(),
                    output: format!("RUNTIME_ERROR[EXECUTION_ERROR: {err}]"),
                    score: 0.0,
                    rationale: String::new(),
                    latency_ms: 0.0,
                    token_cost: 0.0,
                    confidence: 0.0,
                    judge_votes: Vec::new(),
                },
            };
            let (score, rationale) = self
                .judge
                .judge(&case.question, &case.verifier, &execution.output, &self.rubric)
                .await?;

            execution.score = score;
            execution.rationale = rationale;

            let votes = self.judge.last_votes();
            if !votes.is_empty() {
                execution.judge_votes = votes;
            }
            if let Some(confidence) = self.judge.last_confidence() {
                execution.confidence = confidence.clamp(0.0, 1.0);
            }
            if let Some(agreement) = self.judge.last_agreement() {
                agreements.push(agreement.clamp(0.0, 1.0));
            }

            results.push(execution);
        }

        if results.is_empty() {
            return Ok(EvaluationSummary {
                blueprint_id: blueprint.blueprint_id.clone(),
                mean_score: 0.0,
                mean_latency_ms: 0.0,
                mean_token_cost: 0.0,
                total_cases: 0,
                reflection: "no evaluation results".to_string(),
                judge_agreement: 1.0,
                score_std: 0.0,
                split,
                case_results: vec![],
            });
        }

        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        let n = scores.len() as f64;
        let mean_score = scores.iter().sum::<f64>() / n;
        let mean_latency_ms = results.iter().map(|r| r.latency_ms).sum::<f64>() / n;
        let mean_token_cost = results.iter().map(|r| r.token_cost).sum::<f64>() / n;
        let score_std = if scores.len() > 1 {
            let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n;
            variance.sqrt()
        } else {
            0.0
        };
        let judge_agreement = if agreements.is_empty() {
            1.0
        } else {
            agreements.iter().sum::<f64>() / agreements.len() as f64
        };

        let reflection = Self::reflect(&results, split);
        Ok(EvaluationSummary {
            blueprint_id: blueprint.blueprint_id.clone(),
            mean_score,
            mean_latency_ms,
            mean_token_cost,
            total_cases: results.len(),
            reflection,
            judge_agreement,
            score_std,
            split,
            case_results: results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_core::{Action, Difficulty, Expert, Operator, TaskIntent, TopologyPattern};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    struct StubRuntime;

    #[async_trait]
    impl RuntimeAdapter for StubRuntime {
        async fn fetch_schema_snapshot(&self) -> Result<HashMap<String, serde_json::Value>> {
            Ok(HashMap::new())
        }
        async fn fetch_tool_catalog(&self) -> Result<Vec<flowforge_core::ToolSpec>> {
            Ok(vec![])
        }
        async fn execute_case(&self, _blueprint: &WorkflowBlueprint, case: &SyntheticCase) -> Result<CaseExecution> {
            Ok(CaseExecution {
                case_id: case.case_id.clone(),
                question: case.question.clone(),
                expected: case.verifier.clone(),
                output: case.verifier.clone(),
                score: 0.0,
                rationale: String::new(),
                latency_ms: 5.0,
                token_cost: 1.0,
                confidence: 0.0,
                judge_votes: vec![],
            })
        }
        async fn materialize(&self, _blueprint: &WorkflowBlueprint, _output_dir: &Path) -> Result<PathBuf> {
            Ok(PathBuf::from("/tmp/x"))
        }
    }

    fn blueprint() -> WorkflowBlueprint {
        WorkflowBlueprint {
            blueprint_id: "bp-1".into(),
            app_name: "demo".into(),
            task_desc: "answer questions".into(),
            topology: TopologyPattern::Linear,
            tools: vec![],
            actions: vec![Action { name: "noop".into(), description: String::new(), tools: vec![] }],
            experts: vec![Expert {
                name: "GraphTaskExpert".into(),
                operators: vec![Operator {
                    name: "linear_worker".into(),
                    instruction: "answer".into(),
                    output_schema: HashMap::new(),
                    actions: vec!["noop".into()],
                }],
            }],
            leader_actions: vec!["noop".into()],
            parent_id: None,
            mutation_trace: vec![],
            metadata: HashMap::new(),
        }
    }

    fn case(id: &str, verifier: &str) -> SyntheticCase {
        SyntheticCase {
            case_id: id.into(),
            question: "What is it?".into(),
            verifier: verifier.into(),
            intent: TaskIntent::Qa,
            difficulty: Difficulty::L1,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn stable_candidate_reflection_when_all_cases_pass() {
        let judge = Arc::new(crate::judge::default_judge_ensemble(None));
        let evaluator = ReflectionWorkflowEvaluator::new(Arc::new(StubRuntime), judge);
        let bp = blueprint();
        let cases = vec![case("c1", "answer")];
        let summary = evaluator.evaluate(&bp, &cases, Split::Train).await.unwrap();
        assert_eq!(summary.total_cases, 1);
        assert!(summary.reflection.contains("stable candidate"));
    }

    #[tokio::test]
    async fn empty_case_list_yields_zeroed_summary() {
        let judge = Arc::new(crate::judge::default_judge_ensemble(None));
        let evaluator = ReflectionWorkflowEvaluator::new(Arc::new(StubRuntime), judge);
        let bp = blueprint();
        let summary = evaluator.evaluate(&bp, &[], Split::Val).await.unwrap();
        assert_eq!(summary.total_cases, 0);
        assert_eq!(summary.reflection, "no evaluation results");
    }
}
