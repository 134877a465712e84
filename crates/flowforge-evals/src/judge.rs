//! Judge implementations and the weighted ensemble that aggregates them (C3).

use async_trait::async_trait;
use flowforge_core::error::Result;
use flowforge_core::{JudgeVote, LlmJudge};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Strict answer-consistency judge with no lexical scoring, only containment checks.
#[derive(Debug, Default)]
pub struct RuleBasedJudge;

#[async_trait]
impl LlmJudge for RuleBasedJudge {
    async fn judge(&self, _question: &str, expected: &str, prediction: &str, _rubric: &str) -> Result<(f64, String)> {
        let expected_n = expected.trim().to_lowercase();
        let prediction_n = prediction.trim().to_lowercase();

        if prediction_n.is_empty() {
            return Ok((0.0, "empty output".to_string()));
        }
        if !expected_n.is_empty() && expected_n != "unknown" {
            if prediction_n.contains(&expected_n) {
                return Ok((0.95, "expected answer included".to_string()));
            }
            if expected_n.contains(&prediction_n) {
                return Ok((0.75, "prediction is partial expected answer".to_string()));
            }
            return Ok((0.2, "expected answer not supported".to_string()));
        }

        if prediction_n.contains("unknown") {
            return Ok((0.65, "uncertainty explicitly stated".to_string()));
        }
        if prediction_n.split_whitespace().count() < 4 {
            return Ok((0.3, "insufficient answer detail".to_string()));
        }
        Ok((0.55, "rule-based plausibility".to_string()))
    }
}

/// Deterministic lexical token-overlap judge.
#[derive(Debug, Default)]
pub struct HeuristicJudge;

impl HeuristicJudge {
    fn overlap(lhs: &str, rhs: &str) -> f64 {
        let lhs_tokens: HashSet<&str> = lhs.split_whitespace().collect();
        let rhs_tokens: HashSet<&str> = rhs.split_whitespace().collect();
        if lhs_tokens.is_empty() {
            return 0.0;
        }
        lhs_tokens.intersection(&rhs_tokens).count() as f64 / lhs_tokens.len() as f64
    }
}

#[async_trait]
impl LlmJudge for HeuristicJudge {
    async fn judge(&self, question: &str, expected: &str, prediction: &str, _rubric: &str) -> Result<(f64, String)> {
        let expected_n = expected.trim().to_lowercase();
        let prediction_n = prediction.trim().to_lowercase();
        if prediction_n.is_empty() {
            return Ok((0.0, "empty prediction".to_string()));
        }

        if !expected_n.is_empty() && expected_n != "unknown" {
            if expected_n == prediction_n {
                return Ok((1.0, "exact match".to_string()));
            }
            let overlap = Self::overlap(&expected_n, &prediction_n);
            return Ok((overlap, format!("token overlap={overlap:.2}")));
        }

        let overlap = Self::overlap(&question.to_lowercase(), &prediction_n);
        Ok((overlap.clamp(0.1, 0.8), "weak-supervision overlap".to_string()))
    }
}

/// One named, weighted judge participating in an [`EnsembleJudge`].
pub struct WeightedJudge {
    pub name: String,
    pub judge: Box<dyn LlmJudge>,
    pub weight: f64,
}

/// Weighted multi-judge aggregator; tracks per-call reliability signals for callers that
/// need them (the evaluator attaches `last_agreement`/`last_confidence` to its summary).
pub struct EnsembleJudge {
    judges: Vec<WeightedJudge>,
    last: Mutex<EnsembleOutcome>,
}

#[derive(Debug, Clone, Default)]
struct EnsembleOutcome {
    votes: Vec<JudgeVote>,
    agreement: f64,
    confidence: f64,
}

impl EnsembleJudge {
    pub fn new(judges: Vec<WeightedJudge>) -> Self {
        EnsembleJudge {
            judges,
            last: Mutex::new(EnsembleOutcome::default()),
        }
    }

    pub fn last_votes(&self) -> Vec<JudgeVote> {
        self.last.lock().votes.clone()
    }

    pub fn last_agreement(&self) -> f64 {
        self.last.lock().agreement
    }

    pub fn last_confidence(&self) -> f64 {
        self.last.lock().confidence
    }

    fn agreement(scores: &[f64]) -> f64 {
        if scores.len() <= 1 {
            return 1.0;
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        let deviation = variance.sqrt();
        let normalized = (1.0 - deviation).clamp(0.0, 1.0);
        let closeness = scores.iter().map(|s| 1.0 - (s - mean).abs()).sum::<f64>() / scores.len() as f64;
        (0.5 * normalized + 0.5 * closeness).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl LlmJudge for EnsembleJudge {
    async fn judge(&self, question: &str, expected: &str, prediction: &str, rubric: &str) -> Result<(f64, String)> {
        if self.judges.is_empty() {
            return Err(flowforge_core::ForgeError::Validation(
                "EnsembleJudge requires at least one judge".to_string(),
            ));
        }

        let mut votes = Vec::with_capacity(self.judges.len());
        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        for member in &self.judges {
            let (score, rationale) = member.judge.judge(question, expected, prediction, rubric).await?;
            let clamped = score.clamp(0.0, 1.0);
            votes.push(JudgeVote {
                judge_name: member.name.clone(),
                score: clamped,
                rationale,
            });
            weighted_sum += clamped * member.weight;
            weight_sum += member.weight;
        }
        let denom = if weight_sum > 0.0 { weight_sum } else { self.judges.len() as f64 };
        let score = weighted_sum / denom;

        let agreement = Self::agreement(&votes.iter().map(|v| v.score).collect::<Vec<_>>());
        let confidence = (0.5 * score + 0.5 * agreement).clamp(0.0, 1.0);

        let rationale = votes
            .iter()
            .map(|v| format!("{}:{}", v.judge_name, v.rationale))
            .collect::<Vec<_>>()
            .join(" | ");

        *self.last.lock() = EnsembleOutcome { votes, agreement, confidence };
        Ok((score, rationale))
    }

    fn last_votes(&self) -> Vec<JudgeVote> {
        self.last.lock().votes.clone()
    }

    fn last_agreement(&self) -> Option<f64> {
        Some(self.last.lock().agreement)
    }

    fn last_confidence(&self) -> Option<f64> {
        Some(self.last.lock().confidence)
    }
}

/// Builds the default ensemble: rule-based and heuristic judges always included, with an
/// optional third slot left for an LLM-backed judge the caller constructs under the
/// `llm-judge` feature when `judge_backend` is configured for it.
pub fn default_judge_ensemble(llm_judge: Option<(Box<dyn LlmJudge>, f64)>) -> EnsembleJudge {
    let mut judges = vec![
        WeightedJudge { name: "rule".to_string(), judge: Box::new(RuleBasedJudge), weight: 1.0 },
        WeightedJudge { name: "heuristic".to_string(), judge: Box::new(HeuristicJudge), weight: 1.0 },
    ];
    if let Some((judge, weight)) = llm_judge {
        judges.push(WeightedJudge { name: "llm".to_string(), judge, weight });
    }
    EnsembleJudge::new(judges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_based_rewards_contained_expected_answer() {
        let judge = RuleBasedJudge;
        let (score, _) = judge.judge("q", "Paris", "The city is Paris.", "").await.unwrap();
        assert_eq!(score, 0.95);
    }

    #[tokio::test]
    async fn heuristic_scores_exact_match_as_one() {
        let judge = HeuristicJudge;
        let (score, _) = judge.judge("q", "paris", "paris", "").await.unwrap();
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn ensemble_rejects_empty_judge_list() {
        let ensemble = EnsembleJudge::new(vec![]);
        assert!(ensemble.judge("q", "e", "p", "").await.is_err());
    }

    #[tokio::test]
    async fn ensemble_aggregates_weighted_scores_and_tracks_agreement() {
        let ensemble = default_judge_ensemble(None);
        let (score, rationale) = ensemble.judge("q", "paris", "paris", "").await.unwrap();
        assert!(score > 0.9);
        assert!(rationale.contains("rule:"));
        assert!(rationale.contains("heuristic:"));
        assert!(ensemble.last_agreement() > 0.0);
        assert_eq!(ensemble.last_votes().len(), 2);
    }
}
