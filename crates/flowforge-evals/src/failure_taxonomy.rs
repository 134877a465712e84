//! Keyword-rule classification of where an automated run trails a manual baseline (C16).

use flowforge_core::CaseExecution;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const FAILURE_CATEGORIES: [&str; 5] = [
    "tool_selection",
    "decomposition",
    "execution_grounding",
    "verifier_mismatch",
    "other",
];

pub const FAILURE_SEVERITIES: [&str; 3] = ["mild", "moderate", "severe"];

/// Keyword and threshold configuration for failure classification.
#[derive(Debug, Clone)]
pub struct FailureTaxonomyRules {
    pub rules_id: String,
    pub version: String,
    pub execution_keywords: Vec<String>,
    pub tool_keywords: Vec<String>,
    pub decomposition_keywords: Vec<String>,
    pub verifier_mismatch_keywords: Vec<String>,
    pub severe_gap_threshold: f64,
    pub moderate_gap_threshold: f64,
    pub fallback_decomposition_gap_threshold: f64,
}

impl Default for FailureTaxonomyRules {
    fn default() -> Self {
        FailureTaxonomyRules {
            rules_id: "failure_taxonomy_rules_v1".to_string(),
            version: "1.0.0".to_string(),
            execution_keywords: strs(&[
                "runtime_error",
                "timeout",
                "circuit open",
                "execution error",
                "exception",
                "traceback",
                "query failed",
                "cypher syntax",
            ]),
            tool_keywords: strs(&[
                "tool",
                "action",
                "executor",
                "schemagetter",
                "cypherexecutor",
                "pagerankexecutor",
                "knowledgebaseretriever",
                "missing tool",
                "wrong tool",
            ]),
            decomposition_keywords: strs(&[
                "decompose",
                "decomposition",
                "subtask",
                "multi-step",
                "missing step",
                "planning",
                "workflow order",
                "reasoning chain",
            ]),
            verifier_mismatch_keywords: strs(&[
                "verifier",
                "expected",
                "mismatch",
                "not aligned",
                "format",
                "answer differs",
                "incorrect final answer",
            ]),
            severe_gap_threshold: 0.4,
            moderate_gap_threshold: 0.2,
            fallback_decomposition_gap_threshold: 0.2,
        }
    }
}

fn strs(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// On-disk shape accepted by [`FailureTaxonomyRules::load`].
#[derive(Debug, Deserialize)]
struct RulesFile {
    rules_id: String,
    version: String,
    keywords: RulesFileKeywords,
    thresholds: RulesFileThresholds,
}

#[derive(Debug, Deserialize)]
struct RulesFileKeywords {
    execution_grounding: Vec<String>,
    tool_selection: Vec<String>,
    decomposition: Vec<String>,
    verifier_mismatch: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RulesFileThresholds {
    severe_gap: f64,
    moderate_gap: f64,
    fallback_decomposition_gap: f64,
}

impl FailureTaxonomyRules {
    /// Loads a rules override from a `.json` file. Rejects an empty `rules_id`/`version`,
    /// empty keyword lists, out-of-range thresholds, or `moderate_gap > severe_gap`.
    pub fn load(path: &Path) -> Result<Self, String> {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err("failure taxonomy rules file must be .json".to_string());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let parsed: RulesFile = serde_json::from_str(&raw).map_err(|e| e.to_string())?;

        if parsed.rules_id.trim().is_empty() {
            return Err("failure taxonomy rules requires rules_id".to_string());
        }
        if parsed.version.trim().is_empty() {
            return Err("failure taxonomy rules requires version".to_string());
        }
        let execution_keywords = normalize_keywords(parsed.keywords.execution_grounding, "execution_grounding")?;
        let tool_keywords = normalize_keywords(parsed.keywords.tool_selection, "tool_selection")?;
        let decomposition_keywords = normalize_keywords(parsed.keywords.decomposition, "decomposition")?;
        let verifier_mismatch_keywords =
            normalize_keywords(parsed.keywords.verifier_mismatch, "verifier_mismatch")?;

        let severe_gap_threshold = bounded(parsed.thresholds.severe_gap, "thresholds.severe_gap")?;
        let moderate_gap_threshold = bounded(parsed.thresholds.moderate_gap, "thresholds.moderate_gap")?;
        let fallback_decomposition_gap_threshold = bounded(
            parsed.thresholds.fallback_decomposition_gap,
            "thresholds.fallback_decomposition_gap",
        )?;
        if moderate_gap_threshold > severe_gap_threshold {
            return Err("thresholds.moderate_gap must be <= thresholds.severe_gap".to_string());
        }

        Ok(FailureTaxonomyRules {
            rules_id: parsed.rules_id,
            version: parsed.version,
            execution_keywords,
            tool_keywords,
            decomposition_keywords,
            verifier_mismatch_keywords,
            severe_gap_threshold,
            moderate_gap_threshold,
            fallback_decomposition_gap_threshold,
        })
    }
}

fn normalize_keywords(values: Vec<String>, field: &str) -> Result<Vec<String>, String> {
    let cleaned: Vec<String> = values
        .into_iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    if cleaned.is_empty() {
        return Err(format!("keywords.{field} must not be empty"));
    }
    Ok(cleaned)
}

fn bounded(value: f64, field: &str) -> Result<f64, String> {
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{field} must be in [0, 1]"));
    }
    Ok(value)
}

/// The full taxonomy built over an automated run's cases that trail a manual baseline.
#[derive(Debug, Clone, Serialize)]
pub struct FailureTaxonomy {
    pub rules_id: String,
    pub rules_version: String,
    pub total_failures: usize,
    pub failure_margin: f64,
    pub by_category: HashMap<String, usize>,
    pub by_category_ratio: HashMap<String, f64>,
    pub by_severity: HashMap<String, usize>,
    pub by_severity_ratio: HashMap<String, f64>,
    pub case_items: Vec<FailureCaseItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureCaseItem {
    pub case_id: String,
    pub category: String,
    pub severity: String,
    pub signal: String,
    pub auto_score: f64,
    pub manual_score: f64,
    pub score_gap: f64,
}

/// Builds the taxonomy over cases where `auto_score + failure_margin < manual_score`.
pub fn build_failure_taxonomy(
    auto_cases: &[CaseExecution],
    manual_cases: &[CaseExecution],
    failure_margin: f64,
    rules: &FailureTaxonomyRules,
) -> FailureTaxonomy {
    let manual_by_id: HashMap<&str, &CaseExecution> =
        manual_cases.iter().map(|c| (c.case_id.as_str(), c)).collect();

    let mut by_category: HashMap<String, usize> =
        FAILURE_CATEGORIES.iter().map(|c| (c.to_string(), 0)).collect();
    let mut by_severity: HashMap<String, usize> =
        FAILURE_SEVERITIES.iter().map(|s| (s.to_string(), 0)).collect();
    let mut case_items = Vec::new();

    for auto_case in auto_cases {
        let Some(manual_case) = manual_by_id.get(auto_case.case_id.as_str()) else {
            continue;
        };
        if auto_case.score + failure_margin >= manual_case.score {
            continue;
        }

        let (category, signal) = classify_failure_case(auto_case, Some(manual_case), rules);
        let severity = classify_failure_severity(auto_case.score, manual_case.score, rules);
        let gap = manual_case.score - auto_case.score;

        *by_category.get_mut(category).expect("known category") += 1;
        *by_severity.get_mut(severity).expect("known severity") += 1;
        case_items.push(FailureCaseItem {
            case_id: auto_case.case_id.clone(),
            category: category.to_string(),
            severity: severity.to_string(),
            signal,
            auto_score: auto_case.score,
            manual_score: manual_case.score,
            score_gap: gap,
        });
    }

    case_items.sort_by(|a, b| b.score_gap.partial_cmp(&a.score_gap).unwrap_or(std::cmp::Ordering::Equal));
    let total_failures = case_items.len();
    let (by_category_ratio, by_severity_ratio) = if total_failures > 0 {
        let n = total_failures as f64;
        (
            by_category.iter().map(|(k, v)| (k.clone(), *v as f64 / n)).collect(),
            by_severity.iter().map(|(k, v)| (k.clone(), *v as f64 / n)).collect(),
        )
    } else {
        (
            FAILURE_CATEGORIES.iter().map(|c| (c.to_string(), 0.0)).collect(),
            FAILURE_SEVERITIES.iter().map(|s| (s.to_string(), 0.0)).collect(),
        )
    };

    FailureTaxonomy {
        rules_id: rules.rules_id.clone(),
        rules_version: rules.version.clone(),
        total_failures,
        failure_margin,
        by_category,
        by_category_ratio,
        by_severity,
        by_severity_ratio,
        case_items,
    }
}

/// Classifies a single failing case via keyword cascade, falling back to a score-gap check
/// against `fallback_decomposition_gap_threshold` when nothing matches.
pub fn classify_failure_case<'a>(
    auto_case: &CaseExecution,
    manual_case: Option<&CaseExecution>,
    rules: &'a FailureTaxonomyRules,
) -> (&'static str, String) {
    let combined = format!("{}\n{}", auto_case.output, auto_case.rationale).to_lowercase();

    if let Some(matched) = find_first_keyword(&combined, &rules.execution_keywords) {
        return ("execution_grounding", matched);
    }
    if let Some(matched) = find_first_keyword(&combined, &rules.tool_keywords) {
        return ("tool_selection", matched);
    }
    if let Some(matched) = find_first_keyword(&combined, &rules.decomposition_keywords) {
        return ("decomposition", matched);
    }
    if let Some(matched) = find_first_keyword(&combined, &rules.verifier_mismatch_keywords) {
        return ("verifier_mismatch", matched);
    }

    let manual_score = manual_case.map(|c| c.score).unwrap_or(0.0);
    let has_manual_hint = manual_case.is_some();
    if has_manual_hint && auto_case.score + rules.fallback_decomposition_gap_threshold < manual_score {
        return (
            "decomposition",
            format!("manual_gap>={:.3}", rules.fallback_decomposition_gap_threshold),
        );
    }
    ("other", "no_keyword_match".to_string())
}

/// Severity band for a (auto, manual) score pair, comparing `gap + 1e-9` against the
/// thresholds to absorb float jitter at exact boundary values.
pub fn classify_failure_severity(auto_score: f64, manual_score: f64, rules: &FailureTaxonomyRules) -> &'static str {
    let gap = (manual_score - auto_score).max(0.0);
    if gap + 1e-9 >= rules.severe_gap_threshold {
        "severe"
    } else if gap + 1e-9 >= rules.moderate_gap_threshold {
        "moderate"
    } else {
        "mild"
    }
}

fn find_first_keyword(text: &str, keywords: &[String]) -> Option<String> {
    keywords.iter().find(|k| text.contains(k.as_str())).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str, score: f64, output: &str, rationale: &str) -> CaseExecution {
        CaseExecution {
            case_id: id.to_string(),
            question: "q".to_string(),
            expected: "e".to_string(),
            output: output.to_string(),
            score,
            rationale: rationale.to_string(),
            latency_ms: 10.0,
            token_cost: 1.0,
            confidence: 0.0,
            judge_votes: vec![],
        }
    }

    #[test]
    fn keyword_cascade_prefers_execution_over_tool() {
        let rules = FailureTaxonomyRules::default();
        let auto = case("c1", 0.2, "query failed because wrong tool was used", "");
        let (category, signal) = classify_failure_case(&auto, None, &rules);
        assert_eq!(category, "execution_grounding");
        assert_eq!(signal, "query failed");
    }

    #[test]
    fn falls_back_to_decomposition_on_score_gap() {
        let rules = FailureTaxonomyRules::default();
        let auto = case("c1", 0.3, "plain output", "plain rationale");
        let manual = case("c1", 0.9, "plain output", "plain rationale");
        let (category, signal) = classify_failure_case(&auto, Some(&manual), &rules);
        assert_eq!(category, "decomposition");
        assert!(signal.starts_with("manual_gap"));
    }

    #[test]
    fn falls_back_to_other_with_no_manual_hint() {
        let rules = FailureTaxonomyRules::default();
        let auto = case("c1", 0.3, "plain output", "plain rationale");
        let (category, _) = classify_failure_case(&auto, None, &rules);
        assert_eq!(category, "other");
    }

    #[test]
    fn severity_bands_respect_jitter_tolerance() {
        let rules = FailureTaxonomyRules::default();
        assert_eq!(classify_failure_severity(0.1, 0.5, &rules), "severe");
        assert_eq!(classify_failure_severity(0.1, 0.3 - 1e-10, &rules), "moderate");
        assert_eq!(classify_failure_severity(0.1, 0.2, &rules), "mild");
    }

    #[test]
    fn build_taxonomy_skips_cases_auto_already_matches_or_beats() {
        let rules = FailureTaxonomyRules::default();
        let auto = vec![case("c1", 0.9, "ok", "ok")];
        let manual = vec![case("c1", 0.5, "ok", "ok")];
        let taxonomy = build_failure_taxonomy(&auto, &manual, 0.0, &rules);
        assert_eq!(taxonomy.total_failures, 0);
    }
}
