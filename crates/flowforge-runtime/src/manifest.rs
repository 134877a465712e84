//! Rendering and loading of the `workflow.yml` blueprint manifest (spec section 6).
//!
//! The manifest shape mirrors a downstream SDK's expected configuration format rather than
//! our own domain model, which is why it looks odd in places: `toolkit` groups are keyed by
//! action name, and actions/tools/leader actions are all rendered as `{name: ...}` objects
//! instead of bare strings. Operators carry no `name` field in the manifest at all, so the
//! loader has to invent `op_1`, `op_2`, ... when reading one back.

use flowforge_core::error::{ForgeError, Result};
use flowforge_core::models::{Action, Expert, Operator, ToolSpec, WorkflowBlueprint};
use flowforge_core::enums::TopologyPattern;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Serialize)]
struct YamlApp {
    name: String,
    desc: String,
    version: String,
}

#[derive(Serialize)]
struct YamlPlugin {
    workflow_platform: String,
}

#[derive(Serialize)]
struct YamlReasoner {
    #[serde(rename = "type")]
    reasoner_type: String,
}

#[derive(Serialize)]
struct YamlTool {
    name: String,
    #[serde(rename = "type")]
    tool_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    module_path: String,
}

#[derive(Serialize, Deserialize)]
struct YamlNameRef {
    name: String,
}

#[derive(Serialize)]
struct YamlAction {
    name: String,
    desc: String,
    tools: Vec<YamlNameRef>,
}

#[derive(Serialize)]
struct YamlOperator {
    instruction: String,
    output_schema: HashMap<String, String>,
    actions: Vec<YamlNameRef>,
}

#[derive(Serialize)]
struct YamlProfile {
    name: String,
    desc: String,
}

#[derive(Serialize)]
struct YamlExpert {
    profile: YamlProfile,
    workflow: Vec<Vec<YamlOperator>>,
}

#[derive(Serialize)]
struct YamlLeader {
    actions: Vec<YamlNameRef>,
}

#[derive(Serialize)]
struct YamlEnv {
    topology: String,
    meta: HashMap<String, serde_json::Value>,
}

#[derive(Serialize)]
struct YamlManifest {
    app: YamlApp,
    plugin: YamlPlugin,
    reasoner: YamlReasoner,
    tools: Vec<YamlTool>,
    actions: Vec<YamlAction>,
    toolkit: Vec<Vec<YamlNameRef>>,
    experts: Vec<YamlExpert>,
    leader: YamlLeader,
    knowledgebase: HashMap<String, serde_json::Value>,
    memory: HashMap<String, serde_json::Value>,
    env: YamlEnv,
}

/// Renders a blueprint to the manifest's YAML text, field order matching the reference
/// renderer exactly.
pub fn render_workflow_yaml(blueprint: &WorkflowBlueprint) -> Result<String> {
    let tools = blueprint
        .tools
        .iter()
        .map(|t| YamlTool { name: t.name.clone(), tool_type: t.tool_type.clone(), module_path: t.module_path.clone() })
        .collect();

    let actions: Vec<YamlAction> = blueprint
        .actions
        .iter()
        .map(|a| YamlAction {
            name: a.name.clone(),
            desc: a.description.clone(),
            tools: a.tools.iter().map(|name| YamlNameRef { name: name.clone() }).collect(),
        })
        .collect();

    let toolkit = actions.iter().map(|a| vec![YamlNameRef { name: a.name.clone() }]).collect();

    let experts = blueprint
        .experts
        .iter()
        .map(|e| YamlExpert {
            profile: YamlProfile { name: e.name.clone(), desc: String::new() },
            workflow: vec![e
                .operators
                .iter()
                .map(|op| YamlOperator {
                    instruction: op.instruction.clone(),
                    output_schema: op.output_schema.clone(),
                    actions: op.actions.iter().map(|name| YamlNameRef { name: name.clone() }).collect(),
                })
                .collect()],
        })
        .collect();

    let manifest = YamlManifest {
        app: YamlApp { name: blueprint.app_name.clone(), desc: blueprint.task_desc.clone(), version: "0.1.0".to_string() },
        plugin: YamlPlugin { workflow_platform: "BUILTIN".to_string() },
        reasoner: YamlReasoner { reasoner_type: "DUAL".to_string() },
        tools,
        actions,
        toolkit,
        experts,
        leader: YamlLeader { actions: blueprint.leader_actions.iter().map(|name| YamlNameRef { name: name.clone() }).collect() },
        knowledgebase: HashMap::new(),
        memory: HashMap::new(),
        env: YamlEnv { topology: blueprint.topology.as_str().to_string(), meta: blueprint.metadata.clone() },
    };

    serde_yml::to_string(&manifest).map_err(|e| ForgeError::Serialization(e.to_string()))
}

fn external_default_tool_type() -> String {
    "function".to_string()
}

#[derive(Deserialize)]
struct ExternalApp {
    name: String,
    #[serde(default)]
    desc: String,
}

#[derive(Deserialize)]
struct ExternalTool {
    name: String,
    #[serde(rename = "type", default = "external_default_tool_type")]
    tool_type: String,
    #[serde(default)]
    module_path: String,
}

#[derive(Deserialize)]
struct ExternalAction {
    name: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    tools: Vec<YamlNameRef>,
}

#[derive(Deserialize, Default)]
struct ExternalOperator {
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    output_schema: HashMap<String, String>,
    #[serde(default)]
    actions: Vec<YamlNameRef>,
}

#[derive(Deserialize)]
struct ExternalProfile {
    name: String,
    #[serde(default)]
    #[allow(dead_code)]
    desc: String,
}

#[derive(Deserialize)]
struct ExternalExpert {
    profile: ExternalProfile,
    #[serde(default)]
    workflow: Vec<Vec<ExternalOperator>>,
}

#[derive(Deserialize, Default)]
struct ExternalLeader {
    #[serde(default)]
    actions: Vec<YamlNameRef>,
}

#[derive(Deserialize, Default)]
struct ExternalEnv {
    #[serde(default)]
    topology: String,
    #[serde(default)]
    meta: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct ExternalManifest {
    app: ExternalApp,
    #[serde(default)]
    tools: Vec<ExternalTool>,
    #[serde(default)]
    actions: Vec<ExternalAction>,
    #[serde(default)]
    experts: Vec<ExternalExpert>,
    #[serde(default)]
    leader: ExternalLeader,
    #[serde(default)]
    env: ExternalEnv,
}

fn external_to_blueprint(doc: ExternalManifest) -> WorkflowBlueprint {
    let tools: Vec<ToolSpec> = doc
        .tools
        .into_iter()
        .map(|t| ToolSpec { name: t.name, module_path: t.module_path, description: String::new(), tags: Vec::new(), tool_type: t.tool_type })
        .collect();

    let actions: Vec<Action> = doc
        .actions
        .into_iter()
        .map(|a| Action { name: a.name, description: a.desc, tools: a.tools.into_iter().map(|r| r.name).collect() })
        .collect();

    let experts: Vec<Expert> = doc
        .experts
        .into_iter()
        .map(|e| {
            let operators = e.workflow.into_iter().next().unwrap_or_default();
            let operators = operators
                .into_iter()
                .enumerate()
                .map(|(i, op)| Operator {
                    name: format!("op_{}", i + 1),
                    instruction: op.instruction,
                    output_schema: op.output_schema,
                    actions: op.actions.into_iter().map(|r| r.name).collect(),
                })
                .collect();
            Expert { name: e.profile.name, operators }
        })
        .collect();

    let leader_actions = doc.leader.actions.into_iter().map(|r| r.name).collect();
    let topology = TopologyPattern::from_str_lenient(&doc.env.topology.to_lowercase());

    WorkflowBlueprint {
        blueprint_id: format!("manual-{}", uuid::Uuid::new_v4()),
        app_name: doc.app.name,
        task_desc: doc.app.desc,
        topology,
        tools,
        actions,
        experts,
        leader_actions,
        parent_id: None,
        mutation_trace: Vec::new(),
        metadata: doc.env.meta,
    }
}

fn parse_internal_blueprint(mut value: serde_json::Value) -> Result<WorkflowBlueprint> {
    if let Some(topology) = value.get("topology").and_then(|v| v.as_str()).map(|s| s.to_lowercase()) {
        let normalized = TopologyPattern::from_str_lenient(&topology).as_str().to_string();
        if let Some(obj) = value.as_object_mut() {
            obj.insert("topology".to_string(), serde_json::Value::String(normalized));
        }
    }
    serde_json::from_value(value).map_err(|e| ForgeError::Validation(format!("invalid manual blueprint: {e}")))
}

/// Parses a manual blueprint document, accepting either the internal JSON form
/// (`blueprint_id`, `experts`, `actions` at the top level) or the external YAML form
/// (`app`, `experts[].profile`/`workflow`, `leader.actions`).
pub fn parse_manual_blueprint(text: &str) -> Result<WorkflowBlueprint> {
    let value: serde_json::Value =
        serde_yml::from_str(text).map_err(|e| ForgeError::Validation(format!("manual blueprint is not valid JSON/YAML: {e}")))?;
    if !value.is_object() {
        return Err(ForgeError::Validation("manual blueprint must be a JSON/YAML object".to_string()));
    }
    if value.get("blueprint_id").is_some() {
        return parse_internal_blueprint(value);
    }
    if value.get("app").is_some() {
        let doc: ExternalManifest =
            serde_json::from_value(value).map_err(|e| ForgeError::Validation(format!("invalid manual blueprint: {e}")))?;
        return Ok(external_to_blueprint(doc));
    }
    Err(ForgeError::Validation(
        "manual blueprint must have either 'blueprint_id' (internal form) or 'app' (external form)".to_string(),
    ))
}

/// Loads and parses a manual blueprint from disk, rejecting any path that escapes
/// `allow_list_root` (`MANUAL_BLUEPRINTS_DIR`), doesn't exist, or isn't a regular file.
pub async fn load_manual_blueprint(path: &Path, allow_list_root: &Path) -> Result<WorkflowBlueprint> {
    let root = tokio::fs::canonicalize(allow_list_root).await.map_err(|e| {
        ForgeError::Validation(format!("MANUAL_BLUEPRINTS_DIR {} is not accessible: {e}", allow_list_root.display()))
    })?;
    let candidate = if path.is_absolute() { path.to_path_buf() } else { allow_list_root.join(path) };
    let canonical = tokio::fs::canonicalize(&candidate)
        .await
        .map_err(|_| ForgeError::Validation(format!("manual blueprint path {} does not exist under MANUAL_BLUEPRINTS_DIR", path.display())))?;
    if !canonical.starts_with(&root) {
        return Err(ForgeError::Validation(format!("manual blueprint path {} escapes MANUAL_BLUEPRINTS_DIR", path.display())));
    }
    let meta = tokio::fs::metadata(&canonical).await.map_err(ForgeError::Io)?;
    if !meta.is_file() {
        return Err(ForgeError::Validation(format!("manual blueprint path {} is not a file", path.display())));
    }
    let text = tokio::fs::read_to_string(&canonical).await.map_err(ForgeError::Io)?;
    parse_manual_blueprint(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_core::models::{Action, Expert, Operator, ToolSpec as Tool};

    fn sample_blueprint() -> WorkflowBlueprint {
        WorkflowBlueprint {
            blueprint_id: "bp-1".to_string(),
            app_name: "demo".to_string(),
            task_desc: "answer graph questions".to_string(),
            topology: TopologyPattern::PlannerWorkerReviewer,
            tools: vec![Tool {
                name: "CypherExecutor".to_string(),
                module_path: "pkg.cypher".to_string(),
                description: "runs cypher".to_string(),
                tags: vec![],
                tool_type: "function".to_string(),
            }],
            actions: vec![Action {
                name: "use_cypher".to_string(),
                description: "run a query".to_string(),
                tools: vec!["CypherExecutor".to_string()],
            }],
            experts: vec![Expert {
                name: "planner".to_string(),
                operators: vec![Operator {
                    name: "step_1".to_string(),
                    instruction: "plan the query".to_string(),
                    output_schema: HashMap::new(),
                    actions: vec!["use_cypher".to_string()],
                }],
            }],
            leader_actions: vec!["use_cypher".to_string()],
            parent_id: None,
            mutation_trace: vec![],
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn render_includes_action_keyed_toolkit_and_object_refs() {
        let yaml = render_workflow_yaml(&sample_blueprint()).unwrap();
        assert!(yaml.contains("workflow_platform: BUILTIN"));
        assert!(yaml.contains("- name: use_cypher"));
        assert!(yaml.contains("topology: planner_worker_reviewer"));
    }

    #[test]
    fn render_then_load_round_trips_through_external_form() {
        let yaml = render_workflow_yaml(&sample_blueprint()).unwrap();
        let loaded = parse_manual_blueprint(&yaml).unwrap();
        assert_eq!(loaded.app_name, "demo");
        assert_eq!(loaded.topology, TopologyPattern::PlannerWorkerReviewer);
        assert_eq!(loaded.experts[0].operators[0].name, "op_1");
        assert_eq!(loaded.experts[0].operators[0].instruction, "plan the query");
        assert_eq!(loaded.leader_actions, vec!["use_cypher".to_string()]);
    }

    #[test]
    fn internal_form_with_unknown_topology_falls_back_to_planner_worker_reviewer() {
        let json = serde_json::json!({
            "blueprint_id": "bp-2",
            "app_name": "demo",
            "task_desc": "t",
            "topology": "some_unknown_topology",
            "tools": [],
            "actions": [],
            "experts": [],
            "leader_actions": [],
        });
        let blueprint = parse_internal_blueprint(json).unwrap();
        assert_eq!(blueprint.topology, TopologyPattern::PlannerWorkerReviewer);
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = parse_manual_blueprint("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ForgeError::Validation(_)));
    }

    #[test]
    fn payload_missing_both_forms_is_rejected() {
        let err = parse_manual_blueprint("foo: bar").unwrap_err();
        assert!(matches!(err, ForgeError::Validation(_)));
    }

    #[tokio::test]
    async fn load_rejects_path_escaping_allow_list_root() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let evil = outside.path().join("evil.yml");
        tokio::fs::write(&evil, "app: {name: x}").await.unwrap();
        let err = load_manual_blueprint(&evil, dir.path()).await.unwrap_err();
        assert!(matches!(err, ForgeError::Validation(_)));
    }

    #[tokio::test]
    async fn load_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manual_blueprint(Path::new("missing.yml"), dir.path()).await.unwrap_err();
        assert!(matches!(err, ForgeError::Validation(_)));
    }

    #[tokio::test]
    async fn load_reads_a_valid_internal_form_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bp.json");
        let json = serde_json::json!({
            "blueprint_id": "bp-3",
            "app_name": "demo",
            "task_desc": "t",
            "topology": "linear",
            "tools": [],
            "actions": [],
            "experts": [],
            "leader_actions": [],
        });
        tokio::fs::write(&path, serde_json::to_string(&json).unwrap()).await.unwrap();
        let blueprint = load_manual_blueprint(Path::new("bp.json"), dir.path()).await.unwrap();
        assert_eq!(blueprint.blueprint_id, "bp-3");
    }
}
