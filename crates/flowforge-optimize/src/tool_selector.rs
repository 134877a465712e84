//! Capability-aware, lexically-weighted tool ranking (C5).

use flowforge_core::{TaskIntent, ToolSelector, ToolSpec};
use std::collections::{HashMap, HashSet};

/// A tool's inferred capability set, used for intent-alignment scoring.
#[derive(Debug, Clone)]
pub struct ToolCapabilityProfile {
    pub tool_name: String,
    pub capabilities: HashSet<&'static str>,
}

fn capability_keywords() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        ("query", &["query", "cypher", "search", "retrieve"]),
        ("analytics", &["analysis", "algorithm", "rank", "community"]),
        ("modeling", &["schema", "label", "vertex", "edge", "model"]),
        ("import", &["import", "extract", "ingest", "etl"]),
        ("qa", &["knowledge", "qa", "summarize", "browser"]),
    ]
}

fn intent_keywords() -> &'static [(TaskIntent, &'static [&'static str])] {
    &[
        (TaskIntent::Query, &["query", "cypher", "search", "schema"]),
        (TaskIntent::Analytics, &["algorithm", "analysis", "rank", "community"]),
        (TaskIntent::Modeling, &["schema", "model", "label", "vertex", "edge"]),
        (TaskIntent::Import, &["import", "ingest", "extract", "etl"]),
        (TaskIntent::Qa, &["retrieval", "knowledge", "browser", "search"]),
    ]
}

/// Maps a tool catalog to normalized capability sets for policy scoring.
#[derive(Debug, Default)]
pub struct ToolCapabilityMapper;

impl ToolCapabilityMapper {
    pub fn build_profiles(&self, catalog: &[ToolSpec]) -> HashMap<String, ToolCapabilityProfile> {
        catalog
            .iter()
            .map(|tool| {
                (
                    tool.name.clone(),
                    ToolCapabilityProfile {
                        tool_name: tool.name.clone(),
                        capabilities: self.infer_capabilities(tool),
                    },
                )
            })
            .collect()
    }

    pub fn infer_capabilities(&self, tool: &ToolSpec) -> HashSet<&'static str> {
        let text = format!("{} {} {}", tool.name, tool.description, tool.tags.join(" ")).to_lowercase();
        let mut capabilities: HashSet<&'static str> = capability_keywords()
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(capability, _)| *capability)
            .collect();
        if capabilities.is_empty() {
            capabilities.insert("general");
        }
        capabilities
    }
}

/// Ranks tools by lexical relevance to the task description, intent-capability alignment,
/// and a historical-gain bonus.
#[derive(Debug, Default)]
pub struct IntentAwareToolSelector {
    mapper: ToolCapabilityMapper,
}

impl IntentAwareToolSelector {
    pub fn new() -> Self {
        IntentAwareToolSelector { mapper: ToolCapabilityMapper }
    }
}

impl ToolSelector for IntentAwareToolSelector {
    fn rank(
        &self,
        task_desc: &str,
        intents: &[TaskIntent],
        catalog: &[ToolSpec],
        top_k: usize,
        historical_gain: Option<&HashMap<String, f64>>,
    ) -> Vec<ToolSpec> {
        let empty = HashMap::new();
        let historical_gain = historical_gain.unwrap_or(&empty);
        let profiles = self.mapper.build_profiles(catalog);
        let normalized_task = task_desc.to_lowercase();

        let intent_kw: HashMap<TaskIntent, &[&str]> = intent_keywords().iter().cloned().collect();

        let mut weighted: Vec<(f64, String, ToolSpec)> = catalog
            .iter()
            .map(|tool| {
                let profile = &profiles[&tool.name];
                let text = format!("{} {} {}", tool.name, tool.description, tool.tags.join(" ")).to_lowercase();
                let mut lexical = 0.0;
                let mut capability_alignment = 0.0;
                for intent in intents {
                    if let Some(keywords) = intent_kw.get(intent) {
                        for keyword in *keywords {
                            if text.contains(keyword) {
                                lexical += 1.8;
                            }
                            if normalized_task.contains(keyword) {
                                lexical += 0.8;
                            }
                        }
                    }
                    if profile.capabilities.contains(intent.as_str()) {
                        capability_alignment += 1.5;
                    }
                }
                let gain_bonus = historical_gain.get(&tool.name).copied().unwrap_or(0.0);
                let score = lexical + capability_alignment + 0.5 * gain_bonus;
                (score, tool.name.clone(), tool.clone())
            })
            .collect();

        weighted.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });

        weighted.into_iter().take(top_k.max(1)).map(|(_, _, tool)| tool).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, description: &str, tags: &[&str]) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            module_path: "mod".to_string(),
            description: description.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            tool_type: "function".to_string(),
        }
    }

    #[test]
    fn ranks_cypher_executor_above_unrelated_tool_for_query_intent() {
        let selector = IntentAwareToolSelector::new();
        let catalog = vec![
            tool("CypherExecutor", "Run cypher queries against the graph", &["query", "search"]),
            tool("SlackNotifier", "Send a slack message", &["notification"]),
        ];
        let ranked = selector.rank("find entities", &[TaskIntent::Query], &catalog, 2, None);
        assert_eq!(ranked[0].name, "CypherExecutor");
    }

    #[test]
    fn historical_gain_breaks_ties() {
        let selector = IntentAwareToolSelector::new();
        let catalog = vec![
            tool("ToolA", "generic tool", &[]),
            tool("ToolB", "generic tool", &[]),
        ];
        let mut gain = HashMap::new();
        gain.insert("ToolB".to_string(), 2.0);
        let ranked = selector.rank("task", &[], &catalog, 2, Some(&gain));
        assert_eq!(ranked[0].name, "ToolB");
    }

    #[test]
    fn top_k_is_clamped_to_at_least_one() {
        let selector = IntentAwareToolSelector::new();
        let catalog = vec![tool("ToolA", "generic", &[])];
        let ranked = selector.rank("task", &[], &catalog, 0, None);
        assert_eq!(ranked.len(), 1);
    }
}
