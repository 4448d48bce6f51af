//! Agent backed by a local command-line model runner.
//!
//! The prompt is written to the child's stdin and its stdout is the reply, so
//! any CLI with that contract works (`ollama run <model>`, `llm`, a shell
//! script wrapping an HTTP call, ...).

use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use super::{Agent, ChatMessage, GenerateOptions, Generation};
use crate::io::process::run_command_with_timeout;
use crate::task::MAX_TIMEOUT_SECS;

#[derive(Debug, Clone, Deserialize)]
struct ProcessConfig {
    command: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_output_limit_bytes")]
    output_limit_bytes: usize,
    #[serde(default)]
    system_prompt: Option<String>,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_output_limit_bytes() -> usize {
    100_000
}

/// Spawns the configured command once per call.
#[derive(Debug, Clone)]
pub struct ProcessAgent {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    system_prompt: Option<String>,
}

impl ProcessAgent {
    pub fn from_config(name: &str, config: &Map<String, Value>) -> Result<Self> {
        let cfg: ProcessConfig = serde_json::from_value(Value::Object(config.clone()))
            .context("parse process agent config")?;
        let (program, args) = cfg
            .command
            .split_first()
            .filter(|(program, _)| !program.trim().is_empty())
            .ok_or_else(|| anyhow!("'command' must be a non-empty array"))?;
        if cfg.timeout_secs == 0 || cfg.timeout_secs > MAX_TIMEOUT_SECS {
            bail!("'timeout_secs' must be between 1 and {MAX_TIMEOUT_SECS}");
        }
        if cfg.output_limit_bytes == 0 {
            bail!("'output_limit_bytes' must be > 0");
        }
        Ok(Self {
            name: name.to_string(),
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
            system_prompt: cfg.system_prompt,
        })
    }

    /// The configured timeout, shortened to whatever the deadline leaves.
    fn budget(&self, deadline: Option<Instant>) -> Result<Duration> {
        let Some(deadline) = deadline else {
            return Ok(self.timeout);
        };
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .unwrap_or(Duration::ZERO);
        if remaining.is_zero() {
            bail!("deadline already passed");
        }
        Ok(remaining.min(self.timeout))
    }

    #[instrument(skip_all, fields(agent = %self.name, program = %self.program))]
    fn invoke(&self, stdin: &str, options: &GenerateOptions) -> Result<Generation> {
        let timeout = self.budget(options.deadline)?;
        info!(timeout_secs = timeout.as_secs(), "invoking process agent");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        let output =
            run_command_with_timeout(cmd, Some(stdin.as_bytes()), timeout, self.output_limit_bytes)
                .with_context(|| format!("run {}", self.program))?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "process agent timed out");
            bail!("{} timed out after {:?}", self.program, timeout);
        }
        if !output.status.success() {
            let stderr = output.stderr_lossy();
            warn!(exit_code = ?output.status.code(), "process agent failed");
            bail!(
                "{} failed with status {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            );
        }
        Ok(Generation::Text(output.stdout_lossy().trim_end().to_string()))
    }

    fn system_prompt<'a>(&'a self, options: &'a GenerateOptions) -> Option<&'a str> {
        options
            .system_prompt
            .as_deref()
            .or(self.system_prompt.as_deref())
    }
}

impl Agent for ProcessAgent {
    fn name(&self) -> &str {
        &self.name
    }

    /// Output is collected before returning, so `stream` has no effect.
    fn generate_text(&self, prompt: &str, options: &GenerateOptions) -> Result<Generation> {
        let input = match self.system_prompt(options) {
            Some(system) => format!("{system}\n\n{prompt}"),
            None => prompt.to_string(),
        };
        self.invoke(&input, options)
    }

    fn chat(&self, messages: &[ChatMessage], options: &GenerateOptions) -> Result<Generation> {
        let mut rendered = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = self.system_prompt(options) {
            rendered.push(format!("system: {system}"));
        }
        for message in messages {
            rendered.push(format!("{}: {}", message.role.as_str(), message.content));
        }
        self.invoke(&rendered.join("\n\n"), options)
    }
}
