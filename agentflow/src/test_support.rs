//! Test-only builders and scripted components.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Value};

use crate::agents::echo::EchoAgent;
use crate::agents::{Agent, ChatMessage, GenerateOptions, Generation};
use crate::plugins::{Plugin, PluginRequest};
use crate::registry::Components;
use crate::task::Task;

pub const MOCK_PLUGIN: &str = "mock_plugin";
pub const MOCK_AGENT: &str = "mock_agent";

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A task dispatched to a command.
pub fn command_task(id: &str, command: &str) -> Task {
    Task {
        task_id: id.to_string(),
        command: Some(command.to_string()),
        plugin: None,
        agent: None,
        tool: None,
        input: Map::new(),
        output: None,
        options: Map::new(),
        dependencies: Vec::new(),
    }
}

/// A task dispatched to [`MOCK_PLUGIN`] with [`MOCK_AGENT`].
pub fn plugin_task(id: &str, input: Value) -> Task {
    Task {
        task_id: id.to_string(),
        command: None,
        plugin: Some(MOCK_PLUGIN.to_string()),
        agent: Some(MOCK_AGENT.to_string()),
        tool: None,
        input: object(input),
        output: None,
        options: Map::new(),
        dependencies: Vec::new(),
    }
}

/// [`plugin_task`] with explicit dependencies.
pub fn plugin_task_after(id: &str, input: Value, dependencies: &[&str]) -> Task {
    Task {
        dependencies: dependencies.iter().map(|dep| (*dep).to_string()).collect(),
        ..plugin_task(id, input)
    }
}

/// Components holding `plugin` as [`MOCK_PLUGIN`] and an echo agent (prefix
/// `mock: `) as [`MOCK_AGENT`], which is also the default agent.
pub fn components_with(plugin: Arc<dyn Plugin>) -> Arc<Components> {
    let mut components = Components::new();
    components
        .plugins
        .insert(MOCK_PLUGIN, plugin)
        .expect("register mock plugin");
    components
        .agents
        .insert(MOCK_AGENT, Arc::new(EchoAgent::new(MOCK_AGENT, "mock: ")))
        .expect("register mock agent");
    components
        .set_default_agent(MOCK_AGENT)
        .expect("default agent");
    Arc::new(components)
}

/// One recorded [`ScriptedPlugin::execute`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginCall {
    pub task_id: String,
    pub input: Map<String, Value>,
}

enum Script {
    Responses(Mutex<VecDeque<Value>>),
    Fail(String),
    Panic(String),
    /// Sleep, then return the prompt; honours cancellation between naps.
    Sleep(Duration),
}

/// Plugin that records every call and answers from a script.
pub struct ScriptedPlugin {
    script: Script,
    calls: Mutex<Vec<PluginCall>>,
}

impl ScriptedPlugin {
    /// Answers with `values` in order, then errors.
    pub fn returning(values: impl IntoIterator<Item = Value>) -> Self {
        Self::with_script(Script::Responses(Mutex::new(values.into_iter().collect())))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_script(Script::Fail(message.to_string()))
    }

    pub fn panicking(message: &str) -> Self {
        Self::with_script(Script::Panic(message.to_string()))
    }

    /// Sleeps for `delay`, then returns `input.prompt`.
    pub fn sleeping(delay: Duration) -> Self {
        Self::with_script(Script::Sleep(delay))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PluginCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn called_for(&self, task_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.task_id == task_id)
            .count()
    }
}

impl Plugin for ScriptedPlugin {
    fn name(&self) -> &str {
        MOCK_PLUGIN
    }

    fn execute(&self, request: &PluginRequest<'_>) -> Result<Value> {
        self.calls.lock().expect("calls lock").push(PluginCall {
            task_id: request.task_id.to_string(),
            input: request.input.clone(),
        });
        match &self.script {
            Script::Responses(queue) => queue
                .lock()
                .expect("responses lock")
                .pop_front()
                .ok_or_else(|| anyhow!("no scripted response left")),
            Script::Fail(message) => Err(anyhow!("{message}")),
            Script::Panic(message) => panic!("{message}"),
            Script::Sleep(delay) => {
                let step = Duration::from_millis(5);
                let mut slept = Duration::ZERO;
                while slept < *delay {
                    if request.cancel.is_cancelled() {
                        bail!("cancelled");
                    }
                    std::thread::sleep(step);
                    slept += step;
                }
                Ok(request.input.get("prompt").cloned().unwrap_or(Value::Null))
            }
        }
    }
}

/// Agent returning a fixed reply (or error) and recording prompts.
pub struct ScriptedAgent {
    reply: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    fn answer(&self, prompt: String) -> Result<Generation> {
        self.prompts.lock().expect("prompts lock").push(prompt);
        match &self.reply {
            Ok(text) => Ok(Generation::Text(text.clone())),
            Err(message) => bail!("{message}"),
        }
    }
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate_text(&self, prompt: &str, _options: &GenerateOptions) -> Result<Generation> {
        self.answer(prompt.to_string())
    }

    fn chat(&self, messages: &[ChatMessage], _options: &GenerateOptions) -> Result<Generation> {
        let prompt = messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.answer(prompt)
    }
}
