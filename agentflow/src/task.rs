use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

const DEFAULT_OUTPUT_PATH: &str = "output.json";

/// Upper bound for any configured timeout (one week).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// `now + timeout`, with `timeout` capped at [`MAX_TIMEOUT_SECS`].
///
/// `None` only if the clock cannot represent the instant; callers treat that
/// as no deadline.
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout.min(Duration::from_secs(MAX_TIMEOUT_SECS)))
}

/// One unit of work in a pipeline or plan.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default)]
    pub input: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Where (and whether) a task's result is persisted.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputConfig {
    #[serde(default)]
    pub save_to_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

impl OutputConfig {
    pub fn path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH))
    }
}

/// How a task is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch<'a> {
    Command(&'a str),
    Plugin {
        plugin: &'a str,
        agent: &'a str,
        tool: Option<&'a str>,
    },
}

impl Task {
    /// Resolve the dispatch mode; `command` and `plugin` are mutually exclusive
    /// and a plugin task must name its agent.
    pub fn dispatch(&self) -> Result<Dispatch<'_>, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidDispatch {
            task_id: self.task_id.clone(),
            reason: reason.to_string(),
        };
        match (self.command.as_deref(), self.plugin.as_deref()) {
            (Some(_), Some(_)) => Err(invalid("set either 'command' or 'plugin', not both")),
            (None, None) => Err(invalid("one of 'command' or 'plugin' is required")),
            (Some(command), None) => Ok(Dispatch::Command(command)),
            (None, Some(plugin)) => {
                let agent = self
                    .agent
                    .as_deref()
                    .ok_or_else(|| invalid("'agent' is required when 'plugin' is set"))?;
                Ok(Dispatch::Plugin {
                    plugin,
                    agent,
                    tool: self.tool.as_deref(),
                })
            }
        }
    }

    pub fn stream(&self) -> bool {
        self.options
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Per-task timeout override from `options.timeout_secs`, capped at
    /// [`MAX_TIMEOUT_SECS`].
    pub fn timeout_override(&self) -> Option<Duration> {
        self.options
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs.min(MAX_TIMEOUT_SECS)))
    }
}
