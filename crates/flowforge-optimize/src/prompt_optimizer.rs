//! Failure-reflection-guided prompt optimization with a bounded variant registry (C6).

use async_trait::async_trait;
use flowforge_core::error::Result;
use flowforge_core::{CaseExecution, PromptOptimizer, PromptVariant};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const REFINED_CONSTRAINTS_MARKER: &str = "[Refined Constraints]";
const MAX_CONDENSED_FAILURES: usize = 3;

fn condensed_failures(failures: &[CaseExecution]) -> String {
    failures
        .iter()
        .take(MAX_CONDENSED_FAILURES)
        .map(|case| format!("{}:{}", case.case_id, case.rationale))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Appends a fixed constraints block summarizing recent failures. Idempotent: a prompt that
/// already carries the marker is returned unchanged rather than appending a second block.
#[derive(Debug, Default)]
pub struct ReflectionPromptOptimizer;

impl ReflectionPromptOptimizer {
    fn refined_constraints_candidate(prompt: &str, failures: &[CaseExecution]) -> Option<String> {
        if prompt.contains(REFINED_CONSTRAINTS_MARKER) {
            return None;
        }
        let condensed = condensed_failures(failures);
        let suffix = format!(
            "\n{REFINED_CONSTRAINTS_MARKER}\n\
             - Ground answers in tool output and graph schema facts.\n\
             - If evidence is missing, request clarification before final answer.\n\
             - Report assumptions explicitly in one short line.\n\
             - Known failure modes: {condensed}\n"
        );
        Some(format!("{}{suffix}", prompt.trim()))
    }
}

#[async_trait]
impl PromptOptimizer for ReflectionPromptOptimizer {
    async fn optimize(&self, prompt: &str, failures: &[CaseExecution], _task_desc: &str) -> Result<String> {
        if failures.is_empty() {
            return Ok(prompt.to_string());
        }
        match Self::refined_constraints_candidate(prompt, failures) {
            Some(candidate) => Ok(candidate),
            None => Ok(prompt.to_string()),
        }
    }
}

/// Bookkeeping registry of prompt candidates produced across a search run, bounded to
/// `max_candidates` entries and kept sorted by score descending.
#[derive(Debug, Default)]
pub struct PromptVariantRegistry {
    variants: Mutex<Vec<PromptVariant>>,
    max_candidates: usize,
}

impl PromptVariantRegistry {
    pub fn new(max_candidates: usize) -> Self {
        PromptVariantRegistry { variants: Mutex::new(Vec::new()), max_candidates: max_candidates.max(1) }
    }

    pub fn list(&self) -> Vec<PromptVariant> {
        self.variants.lock().clone()
    }

    fn record(&self, prompt: String, source: &str, score: f64) {
        let mut variants = self.variants.lock();
        variants.push(PromptVariant {
            variant_id: format!("variant-{}", Uuid::new_v4().simple()),
            prompt,
            source: source.to_string(),
            score,
            metadata: Default::default(),
        });
        variants.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        variants.truncate(self.max_candidates);
    }
}

const TASK_INTENT_BLOCK: &str = "\n[Task Intent]\n\
     - State the task's intent in one line before acting.\n\
     [Output Discipline]\n\
     - Keep the final answer concise and directly responsive to the question.\n";

const SAFETY_CHECKS_BLOCK: &str = "\n[Safety Checks]\n\
     - Verify tool inputs against the graph schema before execution.\n\
     - Refuse actions that would mutate data outside the task's scope.\n";

const FAILURE_RECOVERY_BLOCK: &str = "\n[Failure Recovery]\n\
     - On a failed verification, retry once with a narrower sub-question.\n\
     - If still unresolved, report the unknown explicitly rather than fabricating an answer.\n";

fn failure_tokens(failures: &[CaseExecution]) -> HashSet<String> {
    failures
        .iter()
        .flat_map(|f| f.rationale.to_lowercase().split_whitespace().map(|t| t.to_string()).collect::<Vec<_>>())
        .collect()
}

fn score_candidate(candidate: &str, total_failure_tokens: &HashSet<String>) -> f64 {
    let lower = candidate.to_lowercase();
    let mut score = 0.5;
    if lower.contains("evidence") {
        score += 0.15;
    }
    if lower.contains("unknown") {
        score += 0.10;
    }
    if lower.contains("fallback") {
        score += 0.05;
    }
    if !total_failure_tokens.is_empty() {
        let candidate_tokens: HashSet<&str> = lower.split_whitespace().collect();
        let covered = total_failure_tokens.iter().filter(|t| candidate_tokens.contains(t.as_str())).count();
        score += 0.20 * (covered as f64 / total_failure_tokens.len() as f64);
    }
    score -= (candidate.len() as f64 / 6000.0).min(0.12);
    score
}

fn generate_candidates(prompt: &str, failures: &[CaseExecution], max_candidates: usize) -> Vec<(String, String)> {
    let mut candidates: Vec<(String, String)> = Vec::new();
    candidates.push(("original".to_string(), prompt.to_string()));

    if let Some(refined) = ReflectionPromptOptimizer::refined_constraints_candidate(prompt, failures) {
        candidates.push(("refined_constraints".to_string(), refined));
    }
    candidates.push((
        "task_intent_output_discipline".to_string(),
        format!("{}{TASK_INTENT_BLOCK}", prompt.trim()),
    ));
    candidates.push(("safety_checks".to_string(), format!("{}{SAFETY_CHECKS_BLOCK}", prompt.trim())));
    candidates.push(("failure_recovery".to_string(), format!("{}{FAILURE_RECOVERY_BLOCK}", prompt.trim())));

    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for (source, text) in candidates {
        let key = text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
        if seen.insert(key) {
            deduped.push((source, text));
        }
    }
    deduped.truncate(max_candidates.max(1));
    deduped
}

/// Generates up to `max_candidates` structurally distinct prompt variants, scores each one
/// against how well it addresses the observed failures, registers every candidate in a
/// run-scoped registry, and returns the highest-scoring prompt.
pub struct CandidatePromptOptimizer {
    max_candidates: usize,
    pub registry: Arc<PromptVariantRegistry>,
}

impl CandidatePromptOptimizer {
    pub fn new(max_candidates: usize) -> Self {
        CandidatePromptOptimizer { max_candidates, registry: Arc::new(PromptVariantRegistry::new(max_candidates)) }
    }

    /// Shares this optimizer's registry so a caller (e.g. the search engine) can read back
    /// the same candidates this optimizer records, without owning the optimizer itself.
    pub fn registry_handle(&self) -> Arc<PromptVariantRegistry> {
        Arc::clone(&self.registry)
    }
}

#[async_trait]
impl PromptOptimizer for CandidatePromptOptimizer {
    async fn optimize(&self, prompt: &str, failures: &[CaseExecution], _task_desc: &str) -> Result<String> {
        if failures.is_empty() {
            return Ok(prompt.to_string());
        }

        let candidates = generate_candidates(prompt, failures, self.max_candidates);
        let total_failure_tokens = failure_tokens(failures);

        let mut best: Option<(f64, usize, String)> = None;
        for (idx, (source, text)) in candidates.into_iter().enumerate() {
            let score = score_candidate(&text, &total_failure_tokens);
            self.registry.record(text.clone(), &source, score);
            let better = match &best {
                None => true,
                Some((best_score, _, _)) => score > *best_score,
            };
            if better {
                best = Some((score, idx, text));
            }
        }

        Ok(best.map(|(_, _, text)| text).unwrap_or_else(|| prompt.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(id: &str, rationale: &str) -> CaseExecution {
        CaseExecution {
            case_id: id.to_string(),
            question: "q".to_string(),
            expected: "e".to_string(),
            output: "o".to_string(),
            score: 0.1,
            rationale: rationale.to_string(),
            latency_ms: 1.0,
            token_cost: 1.0,
            confidence: 0.0,
            judge_votes: vec![],
        }
    }

    #[tokio::test]
    async fn returns_prompt_unchanged_with_no_failures() {
        let optimizer = ReflectionPromptOptimizer;
        let result = optimizer.optimize("do the task", &[], "task").await.unwrap();
        assert_eq!(result, "do the task");
    }

    #[tokio::test]
    async fn appends_refined_constraints_once() {
        let optimizer = ReflectionPromptOptimizer;
        let failures = vec![failure("c1", "missed evidence")];
        let once = optimizer.optimize("do the task", &failures, "task").await.unwrap();
        assert!(once.contains("[Refined Constraints]"));
        assert!(once.contains("c1:missed evidence"));

        let twice = optimizer.optimize(&once, &failures, "task").await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn candidate_optimizer_registers_every_generated_candidate_up_to_the_cap() {
        let optimizer = CandidatePromptOptimizer::new(2);
        let failures = vec![failure("c1", "missing evidence of unknown fallback")];
        optimizer.optimize("prompt a", &failures, "task").await.unwrap();
        assert_eq!(optimizer.registry.list().len(), 2);
    }

    #[tokio::test]
    async fn candidate_optimizer_is_a_no_op_with_no_failures() {
        let optimizer = CandidatePromptOptimizer::new(4);
        let result = optimizer.optimize("prompt a", &[], "task").await.unwrap();
        assert_eq!(result, "prompt a");
        assert!(optimizer.registry.list().is_empty());
    }

    #[tokio::test]
    async fn candidate_optimizer_prefers_the_candidate_covering_more_failure_tokens() {
        let optimizer = CandidatePromptOptimizer::new(4);
        let failures = vec![failure("c1", "evidence unknown fallback safety checks")];
        let result = optimizer.optimize("answer the question", &failures, "task").await.unwrap();
        assert!(result.to_lowercase().contains("evidence") || result.to_lowercase().contains("safety"));
    }

    #[test]
    fn score_candidate_rewards_evidence_unknown_and_fallback_keywords() {
        let empty = HashSet::new();
        let base = score_candidate("answer the question", &empty);
        let enriched = score_candidate("answer with evidence, report unknown as fallback", &empty);
        assert!(enriched > base);
    }
}
