//! Plugin capability: the strategy that turns an agent, an optional tool and a
//! resolved input into a task result.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value};
use tracing::info;

use crate::agents::{Agent, GenerateOptions};
use crate::cancel::CancelToken;
use crate::tools::Tool;

/// Everything a plugin receives for one task execution.
pub struct PluginRequest<'a> {
    pub task_id: &'a str,
    pub agent: &'a dyn Agent,
    pub tool: Option<&'a dyn Tool>,
    pub input: &'a Map<String, Value>,
    pub options: &'a Map<String, Value>,
    pub stream: bool,
    pub cancel: &'a CancelToken,
    pub deadline: Option<Instant>,
}

/// Plugins must be safe to retry: nothing guarantees exactly-once execution.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, request: &PluginRequest<'_>) -> Result<Value>;
}

fn required_str<'a>(input: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("'{key}' is required in input and must be a string"))
}

/// Sends `input.prompt` to the agent and returns the generated text.
///
/// `input.system_prompt` (or `options.system_prompt`) and `options.params`
/// are forwarded to the agent.
#[derive(Debug, Clone)]
pub struct TextGenerationPlugin {
    name: String,
}

impl TextGenerationPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Plugin for TextGenerationPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, request: &PluginRequest<'_>) -> Result<Value> {
        let prompt = match request.input.get("prompt") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => bail!("'prompt' is required in input"),
        };
        let system_prompt = request
            .input
            .get("system_prompt")
            .or_else(|| request.options.get("system_prompt"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let params = request
            .options
            .get("params")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let generation = request.agent.generate_text(
            &prompt,
            &GenerateOptions {
                stream: request.stream,
                system_prompt,
                params,
                deadline: request.deadline,
            },
        )?;
        if request.cancel.is_cancelled() {
            bail!("cancelled");
        }
        Ok(Value::String(generation.into_text()?))
    }
}

/// Calls the task's tool with the input as keyword arguments.
#[derive(Debug, Clone)]
pub struct ToolExecutorPlugin {
    name: String,
}

impl ToolExecutorPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Plugin for ToolExecutorPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, request: &PluginRequest<'_>) -> Result<Value> {
        let tool = request
            .tool
            .ok_or_else(|| anyhow!("tool_executor requires a 'tool' on the task"))?;
        info!(task_id = request.task_id, tool = tool.name(), "executing tool");
        tool.execute(request.input)
    }
}

/// Reads or writes a local file: `{action: read|write, file_path, content?}`.
#[derive(Debug, Clone)]
pub struct FilePlugin {
    name: String,
}

impl FilePlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Plugin for FilePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, request: &PluginRequest<'_>) -> Result<Value> {
        let action = required_str(request.input, "action")?;
        let path = Path::new(required_str(request.input, "file_path")?);
        match action {
            "read" => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("read {}", path.display()))?;
                Ok(Value::String(contents))
            }
            "write" => {
                let content = match request.input.get("content") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => bail!("'content' is required for 'write'"),
                    Some(other) => other.to_string(),
                };
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
                fs::write(path, content).with_context(|| format!("write {}", path.display()))?;
                Ok(Value::String(format!("wrote {}", path.display())))
            }
            other => bail!("unsupported action '{other}', use 'read' or 'write'"),
        }
    }
}
