//! MCTS-style search over prompt/tool/topology mutations with train/val/test holdout (C8).

use crate::prompt_optimizer::PromptVariantRegistry;
use crate::tool_selector::IntentAwareToolSelector;
use flowforge_core::error::Result;
use flowforge_core::{
    Action, EvaluationSummary, Expert, ForgeError, Operator, PromptOptimizer, PromptVariant, SearchNode,
    SearchRoundTrace, Split, SyntheticCase, SyntheticDataset, TaskIntent, ToolSelector, ToolSpec, TopologyPattern,
    WorkflowBlueprint, WorkflowEvaluator,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Tunable knobs for one search run. Defaults mirror the reference configuration; the
/// mutation-enable flags and the two penalty weights are normally overridden per
/// [`crate::profiles::OptimizationKnobs`] rather than left at default.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub rounds: u32,
    pub expansions_per_round: u32,
    pub evaluation_budget: usize,
    pub validation_budget: usize,
    pub test_budget: usize,
    pub exploration_weight: f64,
    pub novelty_weight: f64,
    pub latency_penalty: f64,
    pub cost_penalty: f64,
    pub complexity_penalty: f64,
    pub confidence_weight: f64,
    pub min_improvement: f64,
    pub patience: u32,
    pub enable_prompt_mutation: bool,
    pub enable_tool_mutation: bool,
    pub enable_topology_mutation: bool,
    pub use_holdout: bool,
    pub enable_tool_historical_gain: bool,
    pub uncertainty_penalty: f64,
    pub generalization_penalty: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            rounds: 10,
            expansions_per_round: 3,
            evaluation_budget: 8,
            validation_budget: 6,
            test_budget: 6,
            exploration_weight: 1.2,
            novelty_weight: 0.15,
            latency_penalty: 0.05,
            cost_penalty: 0.05,
            complexity_penalty: 0.02,
            confidence_weight: 0.15,
            min_improvement: 0.005,
            patience: 3,
            enable_prompt_mutation: true,
            enable_tool_mutation: true,
            enable_topology_mutation: true,
            use_holdout: true,
            enable_tool_historical_gain: true,
            uncertainty_penalty: 0.0,
            generalization_penalty: 0.1,
        }
    }
}

/// Everything the orchestration layer needs to persist and report on one search run.
pub struct SearchResult {
    pub best_blueprint: WorkflowBlueprint,
    pub best_evaluation: EvaluationSummary,
    pub validation_evaluation: Option<EvaluationSummary>,
    pub test_evaluation: Option<EvaluationSummary>,
    pub history: Vec<EvaluationSummary>,
    pub round_traces: Vec<SearchRoundTrace>,
    pub prompt_variants: Vec<PromptVariant>,
    pub historical_tool_gain: HashMap<String, f64>,
}

pub struct AFlowXSearchEngine {
    evaluator: Arc<dyn WorkflowEvaluator>,
    prompt_optimizer: Arc<dyn PromptOptimizer>,
    prompt_variant_registry: Option<Arc<PromptVariantRegistry>>,
    tool_selector: Arc<dyn ToolSelector>,
    config: SearchConfig,
}

impl AFlowXSearchEngine {
    pub fn new(
        evaluator: Arc<dyn WorkflowEvaluator>,
        prompt_optimizer: Arc<dyn PromptOptimizer>,
        prompt_variant_registry: Option<Arc<PromptVariantRegistry>>,
        tool_selector: Arc<dyn ToolSelector>,
        config: SearchConfig,
    ) -> Self {
        AFlowXSearchEngine { evaluator, prompt_optimizer, prompt_variant_registry, tool_selector, config }
    }

    pub async fn optimize(
        &self,
        root_blueprint: WorkflowBlueprint,
        dataset: &SyntheticDataset,
        intents: &[TaskIntent],
        tool_catalog: &[ToolSpec],
    ) -> Result<SearchResult> {
        let train_cases = slice_cases(
            non_empty_or(&dataset.train_cases, &dataset.cases),
            self.config.evaluation_budget,
        );
        let (val_cases, test_cases) = if self.config.use_holdout {
            (
                slice_cases(non_empty_or(&dataset.val_cases, &dataset.cases), self.config.validation_budget),
                slice_cases(non_empty_or(&dataset.test_cases, &dataset.cases), self.config.test_budget),
            )
        } else {
            (train_cases.clone(), vec![])
        };

        if train_cases.is_empty() {
            return Err(ForgeError::Validation("train cases must not be empty".to_string()));
        }

        let mut nodes: HashMap<String, SearchNode> = HashMap::new();
        let mut parent_map: HashMap<String, Option<String>> = HashMap::new();
        let mut eval_train_map: HashMap<String, EvaluationSummary> = HashMap::new();
        let mut eval_val_map: HashMap<String, EvaluationSummary> = HashMap::new();

        let mut history = Vec::new();
        let mut round_traces = Vec::new();
        let mut historical_tool_gain: HashMap<String, f64> = HashMap::new();

        let root_node_id = new_node_id();
        let root_node = SearchNode {
            node_id: root_node_id.clone(),
            blueprint: root_blueprint.clone(),
            parent_id: None,
            visits: 0,
            value_sum: 0.0,
            best_score: 0.0,
            last_reflection: String::new(),
            children_ids: vec![],
        };
        nodes.insert(root_node_id.clone(), root_node);
        parent_map.insert(root_node_id.clone(), None);

        let root_train_eval = self.evaluator.evaluate(&root_blueprint, &train_cases, Split::Train).await?;
        let root_val_eval = if self.config.use_holdout {
            let eval = self.evaluator.evaluate(&root_blueprint, &val_cases, Split::Val).await?;
            history.push(root_train_eval.clone());
            history.push(eval.clone());
            eval
        } else {
            history.push(root_train_eval.clone());
            root_train_eval.clone()
        };
        eval_train_map.insert(root_blueprint.blueprint_id.clone(), root_train_eval.clone());
        eval_val_map.insert(root_blueprint.blueprint_id.clone(), root_val_eval.clone());

        let root_objective = self.objective(&root_train_eval, &root_blueprint);
        self.backpropagate(&root_node_id, root_objective, &mut nodes, &parent_map);

        let mut best_by_train_eval = root_train_eval;
        let mut best_by_train_objective = root_objective;

        let mut best_by_val_blueprint = root_blueprint;
        let mut best_by_val_eval = root_val_eval.clone();
        let mut best_by_val_objective =
            self.model_selection_objective(&best_by_train_eval, &root_val_eval, &best_by_val_blueprint);

        let mut no_improve_rounds = 0u32;
        let mut trace_idx = 0u32;

        for round_idx in 1..=self.config.rounds {
            let selected_id = self.select(&nodes)?;
            let selected_blueprint = nodes[&selected_id].blueprint.clone();
            let selected_train_eval = eval_train_map[&selected_blueprint.blueprint_id].clone();
            let selected_train_objective = self.objective(&selected_train_eval, &selected_blueprint);

            let round_best_before = best_by_val_objective;

            for expansion_idx in 0..self.config.expansions_per_round {
                let (mut candidate_blueprint, mutation) = self
                    .mutate(
                        &selected_blueprint,
                        &selected_train_eval,
                        intents,
                        tool_catalog,
                        &historical_tool_gain,
                        round_idx,
                        expansion_idx,
                    )
                    .await?;
                candidate_blueprint.parent_id = Some(selected_blueprint.blueprint_id.clone());
                candidate_blueprint.mutation_trace.push(mutation.clone());

                let child_id = new_node_id();
                let child_node = SearchNode {
                    node_id: child_id.clone(),
                    blueprint: candidate_blueprint.clone(),
                    parent_id: Some(selected_id.clone()),
                    visits: 0,
                    value_sum: 0.0,
                    best_score: 0.0,
                    last_reflection: String::new(),
                    children_ids: vec![],
                };
                nodes.insert(child_id.clone(), child_node);
                parent_map.insert(child_id.clone(), Some(selected_id.clone()));
                nodes.get_mut(&selected_id).expect("selected exists").children_ids.push(child_id.clone());

                let child_train_eval =
                    self.evaluator.evaluate(&candidate_blueprint, &train_cases, Split::Train).await?;
                let child_val_eval = if self.config.use_holdout {
                    let eval = self.evaluator.evaluate(&candidate_blueprint, &val_cases, Split::Val).await?;
                    history.push(child_train_eval.clone());
                    history.push(eval.clone());
                    eval
                } else {
                    history.push(child_train_eval.clone());
                    child_train_eval.clone()
                };
                eval_train_map.insert(candidate_blueprint.blueprint_id.clone(), child_train_eval.clone());
                eval_val_map.insert(candidate_blueprint.blueprint_id.clone(), child_val_eval.clone());

                let child_train_objective = self.objective(&child_train_eval, &candidate_blueprint);
                let child_val_objective =
                    self.model_selection_objective(&child_train_eval, &child_val_eval, &candidate_blueprint);
                self.backpropagate(&child_id, child_train_objective, &mut nodes, &parent_map);

                if child_train_objective > best_by_train_objective {
                    best_by_train_objective = child_train_objective;
                    best_by_train_eval = child_train_eval.clone();
                }
                if child_val_objective > best_by_val_objective {
                    best_by_val_objective = child_val_objective;
                    best_by_val_blueprint = candidate_blueprint.clone();
                    best_by_val_eval = child_val_eval.clone();
                }

                let improvement = child_train_objective - selected_train_objective;
                self.update_tool_gain(&mutation, improvement, &mut historical_tool_gain);

                let regret = (best_by_val_objective - child_val_objective).max(0.0);
                let generalization_gap = if self.config.use_holdout {
                    self.generalization_gap(&child_train_eval, &child_val_eval)
                } else {
                    0.0
                };
                trace_idx += 1;
                round_traces.push(SearchRoundTrace {
                    round_num: trace_idx,
                    selected_node_id: selected_id.clone(),
                    selected_blueprint_id: selected_blueprint.blueprint_id.clone(),
                    mutation,
                    train_objective: child_train_objective,
                    val_objective: child_val_objective,
                    best_train_objective: best_by_train_objective,
                    best_val_objective: best_by_val_objective,
                    improvement,
                    regret,
                    uncertainty: self.uncertainty(&child_val_eval),
                    generalization_gap,
                });
            }

            let round_improvement = best_by_val_objective - round_best_before;
            if round_improvement < self.config.min_improvement {
                no_improve_rounds += 1;
            } else {
                no_improve_rounds = 0;
            }
            if no_improve_rounds >= self.config.patience {
                break;
            }
        }

        let validation_evaluation = if self.config.use_holdout { Some(best_by_val_eval.clone()) } else { None };
        let test_evaluation = if self.config.use_holdout && !test_cases.is_empty() {
            let eval = self.evaluator.evaluate(&best_by_val_blueprint, &test_cases, Split::Test).await?;
            history.push(eval.clone());
            Some(eval)
        } else {
            None
        };

        let prompt_variants = match &self.prompt_variant_registry {
            Some(registry) => registry.list(),
            None => vec![],
        };

        Ok(SearchResult {
            best_blueprint: best_by_val_blueprint,
            best_evaluation: best_by_train_eval,
            validation_evaluation,
            test_evaluation,
            history,
            round_traces,
            prompt_variants,
            historical_tool_gain,
        })
    }

    fn select(&self, nodes: &HashMap<String, SearchNode>) -> Result<String> {
        let total_visits = nodes.values().map(|n| n.visits).sum::<u64>() + 1;
        let mut best_id: Option<String> = None;
        let mut best_ucb = f64::NEG_INFINITY;

        for node in nodes.values() {
            if node.visits == 0 {
                return Ok(node.node_id.clone());
            }
            let exploration =
                self.config.exploration_weight * ((total_visits as f64).ln() / node.visits.max(1) as f64).sqrt();
            let novelty = self.config.novelty_weight * self.novelty_bonus(node);
            let score = node.mean_value() + exploration + novelty;
            if score > best_ucb {
                best_ucb = score;
                best_id = Some(node.node_id.clone());
            }
        }
        best_id.ok_or_else(|| ForgeError::Runtime("select failed on empty node set".to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn mutate(
        &self,
        parent_blueprint: &WorkflowBlueprint,
        parent_eval: &EvaluationSummary,
        intents: &[TaskIntent],
        tool_catalog: &[ToolSpec],
        historical_tool_gain: &HashMap<String, f64>,
        round_idx: u32,
        expansion_idx: u32,
    ) -> Result<(WorkflowBlueprint, String)> {
        let mut modes = Vec::new();
        if self.config.enable_prompt_mutation {
            modes.push("prompt");
        }
        if self.config.enable_tool_mutation && !tool_catalog.is_empty() {
            modes.push("tool");
        }
        if self.config.enable_topology_mutation {
            modes.push("topology");
        }

        if modes.is_empty() {
            let mut candidate = parent_blueprint.clone();
            candidate.blueprint_id = new_blueprint_id();
            return Ok((candidate, "mutation:disabled".to_string()));
        }

        let mode = modes[(round_idx + expansion_idx) as usize % modes.len()];
        match mode {
            "prompt" => self.mutate_prompt(parent_blueprint, parent_eval).await,
            "tool" => {
                let gain_source = if self.config.enable_tool_historical_gain {
                    historical_tool_gain.clone()
                } else {
                    HashMap::new()
                };
                Ok(self.mutate_tools(parent_blueprint, intents, tool_catalog, &gain_source))
            }
            _ => Ok(self.mutate_topology(parent_blueprint)),
        }
    }

    async fn mutate_prompt(
        &self,
        parent_blueprint: &WorkflowBlueprint,
        parent_eval: &EvaluationSummary,
    ) -> Result<(WorkflowBlueprint, String)> {
        let mut candidate = parent_blueprint.clone();
        let Some(first_expert) = candidate.experts.first() else {
            candidate.blueprint_id = new_blueprint_id();
            return Ok((candidate, "prompt:skip-empty".to_string()));
        };
        if first_expert.operators.is_empty() {
            candidate.blueprint_id = new_blueprint_id();
            return Ok((candidate, "prompt:skip-empty".to_string()));
        }

        let failures: Vec<_> = parent_eval.case_results.iter().filter(|r| r.score < 0.6).cloned().collect();
        let operator_name = candidate.experts[0].operators[0].name.clone();
        let instruction = candidate.experts[0].operators[0].instruction.clone();
        let optimized = self.prompt_optimizer.optimize(&instruction, &failures, &candidate.task_desc).await?;
        candidate.experts[0].operators[0].instruction = optimized;

        candidate.blueprint_id = new_blueprint_id();
        Ok((candidate, format!("prompt:optimize({operator_name})")))
    }

    fn mutate_tools(
        &self,
        parent_blueprint: &WorkflowBlueprint,
        intents: &[TaskIntent],
        tool_catalog: &[ToolSpec],
        historical_tool_gain: &HashMap<String, f64>,
    ) -> (WorkflowBlueprint, String) {
        let mut candidate = parent_blueprint.clone();

        let ranked_tools = self.tool_selector.rank(
            &candidate.task_desc,
            intents,
            tool_catalog,
            (candidate.tools.len() + 1).max(1),
            Some(historical_tool_gain),
        );

        let existing: std::collections::HashSet<&str> = candidate.tools.iter().map(|t| t.name.as_str()).collect();
        let new_tool = ranked_tools.into_iter().find(|t| !existing.contains(t.name.as_str()));

        if let Some(new_tool) = new_tool {
            let action_name = format!("use_{}", new_tool.name.to_lowercase());
            candidate.tools.push(new_tool.clone());
            candidate.actions.push(Action {
                name: action_name.clone(),
                description: format!("Use {} to ground graph reasoning.", new_tool.name),
                tools: vec![new_tool.name.clone()],
            });
            'outer: for expert in &mut candidate.experts {
                for operator in &mut expert.operators {
                    if !operator.actions.contains(&action_name) {
                        operator.actions.push(action_name.clone());
                        break 'outer;
                    }
                }
            }
            candidate.blueprint_id = new_blueprint_id();
            return (candidate, format!("tool:add({})", new_tool.name));
        }

        let removable: Vec<String> = candidate
            .actions
            .iter()
            .filter(|a| !candidate.leader_actions.contains(&a.name))
            .map(|a| a.name.clone())
            .collect();
        if let Some(removed) = removable.last().cloned() {
            candidate.actions.retain(|a| a.name != removed);
            for expert in &mut candidate.experts {
                for operator in &mut expert.operators {
                    operator.actions.retain(|name| name != &removed);
                }
            }
            candidate.blueprint_id = new_blueprint_id();
            return (candidate, format!("tool:remove({removed})"));
        }

        candidate.blueprint_id = new_blueprint_id();
        (candidate, "tool:noop".to_string())
    }

    fn mutate_topology(&self, parent_blueprint: &WorkflowBlueprint) -> (WorkflowBlueprint, String) {
        let mut candidate = parent_blueprint.clone();
        candidate.topology = candidate.topology.next();

        for expert in &mut candidate.experts {
            let seed_actions = expert.operators.first().map(|op| op.actions.clone()).unwrap_or_default();
            expert.operators = build_topology_operators(candidate.topology, &seed_actions);
        }

        candidate.blueprint_id = new_blueprint_id();
        (candidate, format!("topology:switch({})", candidate.topology))
    }

    fn objective(&self, summary: &EvaluationSummary, blueprint: &WorkflowBlueprint) -> f64 {
        let complexity =
            blueprint.actions.len() + blueprint.experts.iter().map(|e| e.operators.len()).sum::<usize>();
        let confidence = summary.mean_confidence();
        let uncertainty = self.uncertainty(summary);
        summary.mean_score + self.config.confidence_weight * confidence
            - self.config.latency_penalty * (summary.mean_latency_ms / 1000.0)
            - self.config.cost_penalty * summary.mean_token_cost
            - self.config.complexity_penalty * (complexity as f64 / 10.0)
            - self.config.uncertainty_penalty * uncertainty
    }

    fn model_selection_objective(
        &self,
        train_summary: &EvaluationSummary,
        val_summary: &EvaluationSummary,
        blueprint: &WorkflowBlueprint,
    ) -> f64 {
        let base = self.objective(val_summary, blueprint);
        if !self.config.use_holdout {
            return base;
        }
        let gap = self.generalization_gap(train_summary, val_summary);
        base - self.config.generalization_penalty * gap
    }

    fn uncertainty(&self, summary: &EvaluationSummary) -> f64 {
        let agreement_gap = 1.0 - summary.judge_agreement.clamp(0.0, 1.0);
        let score_spread = summary.score_std.max(0.0);
        agreement_gap + score_spread
    }

    fn generalization_gap(&self, train_summary: &EvaluationSummary, val_summary: &EvaluationSummary) -> f64 {
        (train_summary.mean_score - val_summary.mean_score).max(0.0)
    }

    fn novelty_bonus(&self, node: &SearchNode) -> f64 {
        let unique_mutations = node.blueprint.mutation_trace.iter().collect::<std::collections::HashSet<_>>().len();
        unique_mutations as f64 + node.blueprint.topology.novelty_bonus()
    }

    fn backpropagate(
        &self,
        node_id: &str,
        reward: f64,
        nodes: &mut HashMap<String, SearchNode>,
        parent_map: &HashMap<String, Option<String>>,
    ) {
        let mut cursor = Some(node_id.to_string());
        while let Some(id) = cursor {
            let node = nodes.get_mut(&id).expect("node exists");
            node.visits += 1;
            node.value_sum += reward;
            node.best_score = node.best_score.max(reward);
            cursor = parent_map[&id].clone();
        }
    }

    /// Always folds the improvement into the EMA map, regardless of `enable_tool_historical_gain`;
    /// only the mutation-ranking read path gates on that flag, so re-enabling it mid-run still
    /// sees gain accumulated while it was off.
    fn update_tool_gain(&self, mutation: &str, improvement: f64, historical_tool_gain: &mut HashMap<String, f64>) {
        let Some(tool_name) = mutation.strip_prefix("tool:add(").and_then(|s| s.strip_suffix(')')) else {
            return;
        };
        let old = historical_tool_gain.get(tool_name).copied().unwrap_or(0.0);
        historical_tool_gain.insert(tool_name.to_string(), 0.7 * old + 0.3 * improvement);
    }
}

fn slice_cases(cases: &[SyntheticCase], budget: usize) -> Vec<SyntheticCase> {
    cases.iter().take(budget.max(1)).cloned().collect()
}

fn non_empty_or<'a>(preferred: &'a [SyntheticCase], fallback: &'a [SyntheticCase]) -> &'a [SyntheticCase] {
    if preferred.is_empty() {
        fallback
    } else {
        preferred
    }
}

fn new_node_id() -> String {
    format!("node-{}", &Uuid::new_v4().simple().to_string()[..10])
}

fn new_blueprint_id() -> String {
    format!("bp-{}", &Uuid::new_v4().simple().to_string()[..12])
}

/// Builds the initial blueprint for an agent: one `GraphTaskExpert` wired to the top-ranked
/// tools under the planner/worker/reviewer topology, with the first two tool-actions
/// promoted to leader actions.
pub fn build_initial_blueprint(
    app_name: &str,
    task_desc: &str,
    selected_tools: Vec<ToolSpec>,
    topology: TopologyPattern,
) -> WorkflowBlueprint {
    let mut actions = Vec::new();
    let mut leader_actions = Vec::new();

    for (idx, tool) in selected_tools.iter().enumerate() {
        let action_name = format!("use_{}", tool.name.to_lowercase());
        actions.push(Action {
            name: action_name.clone(),
            description: format!("Use {} during graph reasoning.", tool.name),
            tools: vec![tool.name.clone()],
        });
        if idx < 2 {
            leader_actions.push(action_name);
        }
    }

    let operators = build_topology_operators(topology, &leader_actions);
    let expert = Expert { name: "GraphTaskExpert".to_string(), operators };

    WorkflowBlueprint {
        blueprint_id: new_blueprint_id(),
        app_name: app_name.to_string(),
        task_desc: task_desc.to_string(),
        topology,
        tools: selected_tools,
        actions,
        experts: vec![expert],
        leader_actions,
        parent_id: None,
        mutation_trace: vec![],
        metadata: HashMap::new(),
    }
}

/// The fixed operator sequence for each topology, seeded with the same action list.
pub fn build_topology_operators(topology: TopologyPattern, seed_actions: &[String]) -> Vec<Operator> {
    let mut schema = |key: &str, value: &str| {
        let mut map = HashMap::new();
        map.insert(key.to_string(), value.to_string());
        map
    };

    match topology {
        TopologyPattern::Linear => vec![Operator {
            name: "linear_worker".to_string(),
            instruction: "Solve the graph task with minimal steps and explicit evidence references.".to_string(),
            output_schema: schema("answer", "concise factual answer"),
            actions: seed_actions.to_vec(),
        }],
        TopologyPattern::PlannerWorkerReviewer => vec![
            Operator {
                name: "planner".to_string(),
                instruction: "Plan required graph operations and tools before execution.".to_string(),
                output_schema: schema("plan", "ordered graph actions"),
                actions: seed_actions.to_vec(),
            },
            Operator {
                name: "worker".to_string(),
                instruction: "Execute the plan and collect graph evidence.".to_string(),
                output_schema: schema("draft_answer", "evidence-backed result"),
                actions: seed_actions.to_vec(),
            },
            Operator {
                name: "reviewer".to_string(),
                instruction: "Audit draft answer and patch unsupported claims.".to_string(),
                output_schema: schema("final_answer", "corrected result"),
                actions: seed_actions.to_vec(),
            },
        ],
        TopologyPattern::RouterParallel => vec![
            Operator {
                name: "router".to_string(),
                instruction: "Route request by intent and required capability.".to_string(),
                output_schema: schema("route", "chosen branch"),
                actions: seed_actions.to_vec(),
            },
            Operator {
                name: "worker_query".to_string(),
                instruction: "Process query branch with strict schema grounding.".to_string(),
                output_schema: schema("query_result", "branch output"),
                actions: seed_actions.to_vec(),
            },
            Operator {
                name: "worker_analysis".to_string(),
                instruction: "Process analytics branch with algorithm rationale.".to_string(),
                output_schema: schema("analysis_result", "branch output"),
                actions: seed_actions.to_vec(),
            },
            Operator {
                name: "synthesizer".to_string(),
                instruction: "Merge branch outputs and produce verified final answer.".to_string(),
                output_schema: schema("final_answer", "merged result"),
                actions: seed_actions.to_vec(),
            },
        ],
    }
}

/// Default tool-selector implementation exposed for orchestration wiring.
pub fn default_tool_selector() -> IntentAwareToolSelector {
    IntentAwareToolSelector::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_initial_blueprint_promotes_first_two_tools_to_leader_actions() {
        let tools = vec![
            ToolSpec {
                name: "CypherExecutor".to_string(),
                module_path: "m".to_string(),
                description: "d".to_string(),
                tags: vec![],
                tool_type: "function".to_string(),
            },
            ToolSpec {
                name: "PageRankExecutor".to_string(),
                module_path: "m".to_string(),
                description: "d".to_string(),
                tags: vec![],
                tool_type: "function".to_string(),
            },
            ToolSpec {
                name: "KnowledgeBaseRetriever".to_string(),
                module_path: "m".to_string(),
                description: "d".to_string(),
                tags: vec![],
                tool_type: "function".to_string(),
            },
        ];
        let bp = build_initial_blueprint("demo", "task", tools, TopologyPattern::PlannerWorkerReviewer);
        assert_eq!(bp.leader_actions.len(), 2);
        assert_eq!(bp.experts[0].operators.len(), 3);
    }

    #[test]
    fn topology_operators_match_expected_counts() {
        assert_eq!(build_topology_operators(TopologyPattern::Linear, &[]).len(), 1);
        assert_eq!(build_topology_operators(TopologyPattern::PlannerWorkerReviewer, &[]).len(), 3);
        assert_eq!(build_topology_operators(TopologyPattern::RouterParallel, &[]).len(), 4);
    }
}
