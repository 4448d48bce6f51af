//! Built-in commands: the actions planner-generated tasks dispatch to.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value};

use crate::agents::{Agent, GenerateOptions};
use crate::cancel::CancelToken;
use crate::registry::Registry;

/// What a command can reach while it runs.
pub struct CommandContext<'a> {
    pub agents: &'a Registry<dyn Agent>,
    /// Agent used when a command's arguments do not name one.
    pub default_agent: Option<&'a str>,
    pub cancel: &'a CancelToken,
    pub deadline: Option<Instant>,
}

impl CommandContext<'_> {
    fn agent(&self, requested: Option<&str>) -> Result<std::sync::Arc<dyn Agent>> {
        let name = requested
            .or(self.default_agent)
            .ok_or_else(|| anyhow!("no agent named and no default agent configured"))?;
        self.agents
            .get(name)
            .ok_or_else(|| anyhow!("agent '{name}' not found"))
    }
}

pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn execute(&self, context: &CommandContext<'_>, args: &Map<String, Value>) -> Result<Value>;
}

/// `generate {prompt, agent?, system_prompt?}` → generated text.
#[derive(Debug, Clone, Default)]
pub struct GenerateCommand;

impl Command for GenerateCommand {
    fn name(&self) -> &str {
        "generate"
    }

    fn description(&self) -> &str {
        "Generate text from a prompt. Input: {\"prompt\": string}."
    }

    fn execute(&self, context: &CommandContext<'_>, args: &Map<String, Value>) -> Result<Value> {
        let prompt = match args.get("prompt") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => bail!("'prompt' is required"),
        };
        let agent = context.agent(args.get("agent").and_then(Value::as_str))?;
        let text = agent
            .generate_text(
                &prompt,
                &GenerateOptions {
                    system_prompt: args
                        .get("system_prompt")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    deadline: context.deadline,
                    ..GenerateOptions::default()
                },
            )?
            .into_text()?;
        Ok(Value::String(text))
    }
}

/// `save_to_file {filename, content}` → confirmation message.
///
/// String content is written as-is; any other JSON value is pretty-printed.
#[derive(Debug, Clone, Default)]
pub struct SaveToFileCommand;

impl Command for SaveToFileCommand {
    fn name(&self) -> &str {
        "save_to_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Input: {\"filename\": string, \"content\": any}."
    }

    fn execute(&self, _context: &CommandContext<'_>, args: &Map<String, Value>) -> Result<Value> {
        let filename = args
            .get("filename")
            .or_else(|| args.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("'filename' is required"))?;
        let content = match args.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => bail!("'content' is required"),
            Some(other) => serde_json::to_string_pretty(other)?,
        };
        let path = Path::new(filename);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(path, content).with_context(|| format!("write {}", path.display()))?;
        Ok(Value::String(format!("saved {}", path.display())))
    }
}
