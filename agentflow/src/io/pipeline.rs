//! Pipeline document loading: schema validation plus semantic checks.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use jsonschema::{Validator, validator_for};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{ComponentKind, ConfigError};
use crate::plan::Plan;
use crate::task::Task;

const PIPELINE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/pipeline.schema.json"
));

static VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(PIPELINE_SCHEMA).expect("embedded pipeline schema");
    validator_for(&schema).expect("compile pipeline schema")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Local,
    Github,
}

/// One agent, plugin or tool declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    pub module: String,
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
}

/// A validated pipeline document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub agents: Vec<ComponentSpec>,
    pub plugins: Vec<ComponentSpec>,
    pub tools: Vec<ComponentSpec>,
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<Value>,
}

impl PipelineConfig {
    /// The configured task list as a plan.
    ///
    /// With `infer_dependencies`, placeholders that name another task of the
    /// pipeline also count as dependencies.
    pub fn plan(&self, infer_dependencies: bool) -> Result<Plan, ConfigError> {
        if infer_dependencies {
            Plan::with_inferred_dependencies(self.tasks.clone())
        } else {
            Plan::new(self.tasks.clone())
        }
    }
}

/// Schema errors for a raw document, one message per violation.
pub fn validate_config(document: &Value) -> Result<(), ConfigError> {
    if VALIDATOR.is_valid(document) {
        return Ok(());
    }
    let messages = VALIDATOR
        .iter_errors(document)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    Err(ConfigError::Schema(messages))
}

pub fn is_valid_config(document: &Value) -> bool {
    VALIDATOR.is_valid(document)
}

/// Validate and deserialize a raw document.
pub fn parse_pipeline(document: &Value) -> Result<PipelineConfig, ConfigError> {
    validate_config(document)?;
    let config: PipelineConfig = serde_json::from_value(document.clone())
        .map_err(|err| ConfigError::Schema(vec![err.to_string()]))?;
    check_unique_names(ComponentKind::Agent, &config.agents)?;
    check_unique_names(ComponentKind::Plugin, &config.plugins)?;
    check_unique_names(ComponentKind::Tool, &config.tools)?;
    for task in &config.tasks {
        task.dispatch()?;
    }
    if !config.modules.is_empty() {
        warn!(count = config.modules.len(), "ignoring 'modules' section");
    }
    Ok(config)
}

/// Read, validate and deserialize a pipeline document from disk.
pub fn load_pipeline(path: &Path) -> Result<PipelineConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read pipeline {}", path.display()))?;
    let document: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse pipeline {}", path.display()))?;
    let config = parse_pipeline(&document)
        .with_context(|| format!("invalid pipeline {}", path.display()))?;
    info!(
        path = %path.display(),
        agents = config.agents.len(),
        plugins = config.plugins.len(),
        tools = config.tools.len(),
        tasks = config.tasks.len(),
        "loaded pipeline"
    );
    Ok(config)
}

fn check_unique_names(kind: ComponentKind, specs: &[ComponentSpec]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(ConfigError::DuplicateComponent {
                kind,
                name: spec.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "agents": [
                {"name": "local", "module": "echo", "class": "EchoAgent", "source": "local", "config": {}}
            ],
            "plugins": [
                {"name": "text_generation", "module": "text_generation", "source": "local"}
            ],
            "tools": [],
            "tasks": [
                {
                    "task_id": "poem",
                    "plugin": "text_generation",
                    "agent": "local",
                    "tool": null,
                    "input": {"prompt": "Write a poem"},
                    "output": {"save_to_file": true, "file_path": "poem.json"},
                    "options": {"stream": false}
                },
                {
                    "task_id": "save",
                    "command": "save_to_file",
                    "input": {"filename": "poem.txt", "content": "{{tasks.poem.output}}"}
                }
            ]
        })
    }

    #[test]
    fn accepts_valid_document() {
        let doc = document();
        assert!(is_valid_config(&doc));
        let config = parse_pipeline(&doc).expect("parse");
        assert_eq!(config.agents[0].class_name.as_deref(), Some("EchoAgent"));
        assert_eq!(config.tasks.len(), 2);
        let plan = config.plan(true).expect("plan");
        assert_eq!(plan.get("save").expect("save").dependencies, vec!["poem".to_string()]);
    }

    #[test]
    fn missing_top_level_array_is_a_schema_error() {
        let mut doc = document();
        doc.as_object_mut().expect("object").remove("tools");
        assert!(!is_valid_config(&doc));
        let Err(ConfigError::Schema(messages)) = validate_config(&doc) else {
            panic!("expected schema error");
        };
        assert!(messages.iter().any(|m| m.contains("tools")));
    }

    #[test]
    fn agent_without_config_is_rejected() {
        let mut doc = document();
        doc["agents"][0].as_object_mut().expect("agent").remove("config");
        assert!(!is_valid_config(&doc));
    }

    #[test]
    fn task_with_both_command_and_plugin_is_rejected() {
        let mut doc = document();
        doc["tasks"][0]["command"] = json!("generate");
        assert!(!is_valid_config(&doc));
    }

    #[test]
    fn plugin_task_without_agent_is_rejected() {
        let mut doc = document();
        doc["tasks"][0].as_object_mut().expect("task").remove("agent");
        assert!(!is_valid_config(&doc));
    }

    #[test]
    fn timeout_option_is_bounded() {
        let mut doc = document();
        doc["tasks"][0]["options"]["timeout_secs"] = json!(crate::task::MAX_TIMEOUT_SECS);
        assert!(is_valid_config(&doc));
        doc["tasks"][0]["options"]["timeout_secs"] = json!(u64::MAX);
        assert!(!is_valid_config(&doc));
        doc["tasks"][0]["options"]["timeout_secs"] = json!(0);
        assert!(!is_valid_config(&doc));
    }

    #[test]
    fn duplicate_component_names_are_rejected() {
        let mut doc = document();
        let agent = doc["agents"][0].clone();
        doc["agents"].as_array_mut().expect("agents").push(agent);
        assert_eq!(
            parse_pipeline(&doc).unwrap_err(),
            ConfigError::DuplicateComponent {
                kind: ComponentKind::Agent,
                name: "local".to_string(),
            }
        );
    }

    #[test]
    fn load_pipeline_reports_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("pipeline.json");
        fs::write(&path, "{not json").expect("write");
        let err = load_pipeline(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parse pipeline"));

        fs::write(&path, serde_json::to_string(&document()).expect("json")).expect("write");
        let config = load_pipeline(&path).expect("load");
        assert_eq!(config.plugins[0].source, Source::Local);
    }
}
