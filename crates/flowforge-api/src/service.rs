//! Orchestration service (C12, spec section 4.11): wires the synthesizer, tool selector,
//! search engine, and repository/artifact-store persistence into the two user-facing
//! operations, `optimize` and `benchmark_manual_parity`.

use crate::auth::AuthContext;
use crate::dto::{OptimizeResponse, ParityResponse};
use flowforge_core::config::{RuntimeMode, Settings};
use flowforge_core::enums::{AgentLifecycle, ExperimentProfile, Split};
use flowforge_core::error::{ForgeError, Result};
use flowforge_core::models::{AgentVersionRecord, ArtifactIndexEntry, EvaluationSummary, OptimizationRun, SyntheticCase};
use flowforge_core::protocols::{DatasetSynthesizer, RuntimeAdapter, WorkflowEvaluator};
use flowforge_evals::{build_failure_taxonomy, default_judge_ensemble, FailureTaxonomyRules, ReflectionWorkflowEvaluator};
use flowforge_optimize::{
    build_initial_blueprint, resolve_optimization_knobs, synthesizer::infer_intents, AFlowXSearchEngine,
    CandidatePromptOptimizer, DynamicDatasetSynthesizer, IntentAwareToolSelector, SearchConfig, SearchResult,
};
use flowforge_registry::{ArtifactStore, Repository};
use flowforge_runtime::{load_manual_blueprint, render_workflow_yaml, ExternalExecutor, MockExecutor};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Everything `benchmark_manual_parity` needs out of an `optimize()` run: the response handed
/// back to its own caller, the run's artifact prefix (parity artifacts land alongside it), the
/// search result (for its held-out evaluations), and the dataset partition the search ran over
/// (so the manual blueprint can be evaluated on the exact same cases).
struct OptimizeRun {
    response: OptimizeResponse,
    run_prefix: String,
    search_result: SearchResult,
    train_cases: Vec<SyntheticCase>,
    val_cases: Vec<SyntheticCase>,
    test_cases: Vec<SyntheticCase>,
}

/// Everything the two orchestration operations share: repository, artifact store, and
/// process settings.
pub struct OrchestrationService {
    repository: Arc<dyn Repository>,
    artifact_store: Arc<dyn ArtifactStore>,
    settings: Arc<Settings>,
}

impl OrchestrationService {
    pub fn new(repository: Arc<dyn Repository>, artifact_store: Arc<dyn ArtifactStore>, settings: Arc<Settings>) -> Self {
        OrchestrationService { repository, artifact_store, settings }
    }

    fn build_runtime(&self) -> Result<Arc<dyn RuntimeAdapter>> {
        Ok(match self.settings.executor_runtime_mode {
            RuntimeMode::Mock => Arc::new(MockExecutor::new()),
            RuntimeMode::External => Arc::new(ExternalExecutor::new(&self.settings)?),
        })
    }

    async fn put_json(&self, run_prefix: &str, file_name: &str, artifact_type: &str, value: &impl serde::Serialize) -> Result<ArtifactIndexEntry> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let result = self.artifact_store.put(&format!("{run_prefix}/{file_name}"), bytes).await?;
        Ok(ArtifactIndexEntry {
            artifact_type: artifact_type.to_string(),
            uri: result.uri,
            checksum: result.sha256,
            size_bytes: result.size,
            created_at: chrono::Utc::now(),
        })
    }

    /// Runs one end-to-end search over a freshly synthesized dataset and persists the
    /// result as a new agent version (spec section 4.11's `optimize()` procedure).
    pub async fn optimize(
        &self,
        ctx: &AuthContext,
        agent_name: &str,
        task_desc: &str,
        dataset_size: Option<usize>,
        profile_tag: &str,
        seed: Option<u64>,
    ) -> Result<OptimizeResponse> {
        Ok(self.run_optimize(ctx, agent_name, task_desc, dataset_size, profile_tag, seed).await?.response)
    }

    async fn run_optimize(
        &self,
        ctx: &AuthContext,
        agent_name: &str,
        task_desc: &str,
        dataset_size: Option<usize>,
        profile_tag: &str,
        seed: Option<u64>,
    ) -> Result<OptimizeRun> {
        let scoped_agent = ctx.scoped_agent_name(agent_name);
        self.repository.ensure_agent(&scoped_agent).await?;
        let version = self.repository.next_version(&scoped_agent).await?;

        let profile = ExperimentProfile::parse_lenient(profile_tag);
        let knobs = resolve_optimization_knobs(profile);

        let runtime = self.build_runtime()?;
        let requested_size = dataset_size.unwrap_or(self.settings.default_dataset_size);
        let synthesizer = DynamicDatasetSynthesizer::new(
            Arc::clone(&runtime),
            seed,
            self.settings.train_ratio,
            self.settings.val_ratio,
            self.settings.test_ratio,
            knobs.enable_hard_negatives,
            knobs.enable_paraphrase,
        )?;
        let dataset = synthesizer.synthesize(task_desc, agent_name, requested_size).await?;

        let catalog = runtime.fetch_tool_catalog().await?;
        let intents = infer_intents(&dataset.cases);
        let tool_selector = IntentAwareToolSelector::new();
        let selected_tools = flowforge_core::protocols::ToolSelector::rank(&tool_selector, task_desc, &intents, &catalog, catalog.len().max(1), None);
        let root_blueprint =
            build_initial_blueprint(agent_name, task_desc, selected_tools, flowforge_core::enums::TopologyPattern::PlannerWorkerReviewer);

        let judge = Arc::new(default_judge_ensemble(None));
        let evaluator: Arc<dyn WorkflowEvaluator> = Arc::new(ReflectionWorkflowEvaluator::new(Arc::clone(&runtime), judge));
        let prompt_optimizer = CandidatePromptOptimizer::new(self.settings.max_prompt_candidates);
        let registry = prompt_optimizer.registry_handle();
        let prompt_optimizer = Arc::new(prompt_optimizer);

        let mut search_config = SearchConfig { rounds: self.settings.max_search_rounds, ..SearchConfig::default() };
        search_config.expansions_per_round = self.settings.max_expansions_per_round;
        search_config.enable_prompt_mutation = knobs.enable_prompt_mutation;
        search_config.enable_tool_mutation = knobs.enable_tool_mutation;
        search_config.enable_topology_mutation = knobs.enable_topology_mutation;
        search_config.use_holdout = knobs.use_holdout;
        search_config.enable_tool_historical_gain = knobs.enable_tool_historical_gain;
        search_config.uncertainty_penalty = knobs.uncertainty_penalty;
        search_config.generalization_penalty = knobs.generalization_penalty;

        let engine = AFlowXSearchEngine::new(
            Arc::clone(&evaluator),
            prompt_optimizer,
            Some(registry),
            Arc::new(tool_selector),
            search_config,
        );

        let search_result = engine.optimize(root_blueprint, &dataset, &intents, &catalog).await?;

        let run_id = format!("run-{}", Uuid::new_v4());
        let run_prefix = format!("agents/{agent_name}/{run_id}");

        let workflow_path = std::env::temp_dir().join(format!("flowforge-{run_id}"));
        let materialized = runtime.materialize(&search_result.best_blueprint, &workflow_path).await?;
        let workflow_bytes = tokio::fs::read(&materialized).await.map_err(ForgeError::Io)?;
        let workflow_artifact = {
            let result = self.artifact_store.put(&format!("{run_prefix}/workflow.yml"), workflow_bytes).await?;
            ArtifactIndexEntry {
                artifact_type: "workflow_yaml".to_string(),
                uri: result.uri.clone(),
                checksum: result.sha256.clone(),
                size_bytes: result.size,
                created_at: chrono::Utc::now(),
            }
        };

        let dataset_artifact = self.put_json(&run_prefix, "dataset_report.json", "dataset_report", &dataset.synthesis_report).await?;
        let traces_artifact = self.put_json(&run_prefix, "round_traces.json", "round_traces", &search_result.round_traces).await?;
        let prompts_artifact = self.put_json(&run_prefix, "prompt_variants.json", "prompt_variants", &search_result.prompt_variants).await?;

        let best_val_score = search_result.validation_evaluation.as_ref().map(|e| e.mean_score);
        let best_test_score = search_result.test_evaluation.as_ref().map(|e| e.mean_score);

        let run = OptimizationRun {
            run_id: run_id.clone(),
            agent_name: scoped_agent.clone(),
            task_desc: task_desc.to_string(),
            artifact_dir: run_prefix.clone(),
            best_blueprint_id: search_result.best_blueprint.blueprint_id.clone(),
            best_train_score: search_result.best_evaluation.mean_score,
            best_val_score,
            best_test_score,
            round_traces: search_result.round_traces.clone(),
            artifact_index: vec![workflow_artifact.clone(), dataset_artifact, traces_artifact, prompts_artifact],
        };
        self.repository.create_run(&run).await?;
        self.repository.insert_round_traces(&run_id, &search_result.round_traces).await?;
        for artifact in &run.artifact_index {
            self.repository.insert_artifact(&run_id, artifact).await?;
        }

        let version_record = AgentVersionRecord {
            agent_name: scoped_agent.clone(),
            version,
            lifecycle: AgentLifecycle::Validated,
            blueprint_id: search_result.best_blueprint.blueprint_id.clone(),
            score: search_result.best_evaluation.mean_score,
            artifact_path: workflow_artifact.uri.clone(),
            created_at: chrono::Utc::now(),
            notes: format!("profile={}", profile.as_str()),
        };
        self.repository.create_version(version_record, Some(&run_id)).await?;

        let run_summary_artifact = self.put_json(&run_prefix, "run_summary.json", "run_summary", &run).await?;
        self.repository.insert_artifact(&run_id, &run_summary_artifact).await?;

        let response = OptimizeResponse {
            run_id,
            agent_name: agent_name.to_string(),
            version,
            blueprint_id: search_result.best_blueprint.blueprint_id.clone(),
            lifecycle: AgentLifecycle::Validated,
            best_train_score: run.best_train_score,
            best_val_score: run.best_val_score,
            best_test_score: run.best_test_score,
            profile: profile.as_str().to_string(),
            round_traces: run.round_traces,
            artifact_index: run.artifact_index,
        };

        Ok(OptimizeRun {
            response,
            run_prefix,
            search_result,
            train_cases: dataset.train_cases,
            val_cases: dataset.val_cases,
            test_cases: dataset.test_cases,
        })
    }

    /// Picks the parity split per spec: test if the optimize run's dataset has test cases and
    /// a test evaluation, else val, else train (train's `best_evaluation` is always present).
    fn select_parity_slice(optimize_run: &OptimizeRun) -> (Split, &EvaluationSummary, &[SyntheticCase]) {
        if !optimize_run.test_cases.is_empty() {
            if let Some(eval) = optimize_run.search_result.test_evaluation.as_ref() {
                return (Split::Test, eval, &optimize_run.test_cases);
            }
        }
        if !optimize_run.val_cases.is_empty() {
            if let Some(eval) = optimize_run.search_result.validation_evaluation.as_ref() {
                return (Split::Val, eval, &optimize_run.val_cases);
            }
        }
        (Split::Train, &optimize_run.search_result.best_evaluation, &optimize_run.train_cases)
    }

    /// Runs `optimize()` for the auto side, evaluates the manual blueprint on the matching
    /// split, and reports their gap plus a failure taxonomy (spec section 4.11's
    /// `benchmarkManualParity()` procedure).
    pub async fn benchmark_manual_parity(
        &self,
        ctx: &AuthContext,
        agent_name: &str,
        task_desc: &str,
        manual_blueprint_path: &str,
        dataset_size: Option<usize>,
        seed: Option<u64>,
        parity_margin: f64,
    ) -> Result<ParityResponse> {
        let allow_list_root = Path::new(&self.settings.manual_blueprints_dir);
        let manual_blueprint = load_manual_blueprint(Path::new(manual_blueprint_path), allow_list_root).await?;

        let optimize_run = self
            .run_optimize(ctx, agent_name, task_desc, dataset_size, ExperimentProfile::FullSystem.as_str(), seed)
            .await?;

        let (split, auto_eval, manual_cases) = Self::select_parity_slice(&optimize_run);

        let runtime = self.build_runtime()?;
        let judge = Arc::new(default_judge_ensemble(None));
        let evaluator = ReflectionWorkflowEvaluator::new(Arc::clone(&runtime), judge);
        let manual_eval = evaluator.evaluate(&manual_blueprint, manual_cases, split).await?;

        let score_gap = auto_eval.mean_score - manual_eval.mean_score;
        let parity_achieved = auto_eval.mean_score + parity_margin >= manual_eval.mean_score;

        let rules = FailureTaxonomyRules::default();
        let taxonomy = build_failure_taxonomy(&auto_eval.case_results, &manual_eval.case_results, parity_margin, &rules);

        let run_id = optimize_run.response.run_id.clone();
        let run_prefix = &optimize_run.run_prefix;
        let parity_report = serde_json::json!({
            "agent_name": ctx.scoped_agent_name(agent_name),
            "split": split,
            "manual_score": manual_eval.mean_score,
            "auto_score": auto_eval.mean_score,
            "score_gap": score_gap,
            "parity_margin": parity_margin,
            "parity_achieved": parity_achieved,
        });
        let report_artifact = self.put_json(run_prefix, "manual_parity_report.json", "manual_parity_report", &parity_report).await?;
        let case_artifact = self.put_json(run_prefix, "manual_parity_case_report.json", "manual_parity_case_report", &taxonomy).await?;
        self.repository.insert_artifact(&run_id, &report_artifact).await?;
        self.repository.insert_artifact(&run_id, &case_artifact).await?;

        Ok(ParityResponse {
            agent_name: agent_name.to_string(),
            split,
            manual_score: manual_eval.mean_score,
            auto_score: auto_eval.mean_score,
            score_gap,
            parity_margin,
            parity_achieved,
            failure_taxonomy: taxonomy,
        })
    }
}
