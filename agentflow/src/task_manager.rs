//! Single-task execution and the sequential, chained batch path.
//!
//! [`TaskRunner`] turns one task plus a view of prior results into a
//! [`TaskOutcome`]. It never returns an error: misconfiguration, plugin
//! errors and panics all become failed outcomes so siblings keep running.
//! [`TaskManager`] drives a batch in order and owns the results table.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::cancel::CancelToken;
use crate::commands::CommandContext;
use crate::core::resolver::{TaskResults, resolve_map};
use crate::core::types::{FailureReason, TaskOutcome, TaskReport};
use crate::io::output::write_json;
use crate::plugins::PluginRequest;
use crate::registry::Components;
use crate::task::{Dispatch, Task, deadline_after};

/// Executes individual tasks against a set of loaded components.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    components: Arc<Components>,
}

impl TaskRunner {
    pub fn new(components: Arc<Components>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Resolve the task's input against `results` and execute it.
    ///
    /// Outputs are not persisted here; see [`save_task_output`].
    #[instrument(skip_all, fields(task_id = %task.task_id))]
    pub fn run_task(
        &self,
        task: &Task,
        results: &TaskResults,
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> TaskOutcome {
        let input = resolve_map(&task.input, results);
        let attempt = catch_unwind(AssertUnwindSafe(|| {
            self.execute(task, &input, cancel, deadline)
        }));
        match attempt {
            Ok(Ok(value)) => {
                info!("task completed");
                TaskOutcome::Completed(value)
            }
            Ok(Err(reason)) => {
                warn!(reason = %reason, "task failed");
                TaskOutcome::Failed(reason)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(panic = %message, "task panicked");
                TaskOutcome::Failed(FailureReason::Panicked(message))
            }
        }
    }

    fn execute(
        &self,
        task: &Task,
        input: &Map<String, Value>,
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<Value, FailureReason> {
        let skip = |err: crate::error::ConfigError| FailureReason::Misconfigured(err.to_string());
        let failed = |err: anyhow::Error| FailureReason::Execution(format!("{err:#}"));

        match task.dispatch().map_err(skip)? {
            Dispatch::Command(name) => {
                let command = self.components.commands.require(name).map_err(skip)?;
                let context = CommandContext {
                    agents: &self.components.agents,
                    default_agent: self.components.default_agent(),
                    cancel,
                    deadline,
                };
                info!(command = name, "executing command");
                command.execute(&context, input).map_err(failed)
            }
            Dispatch::Plugin {
                plugin,
                agent,
                tool,
            } => {
                let plugin = self.components.plugins.require(plugin).map_err(skip)?;
                let agent = self.components.agents.require(agent).map_err(skip)?;
                let tool = tool
                    .map(|name| self.components.tools.require(name))
                    .transpose()
                    .map_err(skip)?;
                info!(plugin = plugin.name(), agent = agent.name(), "executing plugin");
                plugin
                    .execute(&PluginRequest {
                        task_id: &task.task_id,
                        agent: agent.as_ref(),
                        tool: tool.as_deref(),
                        input,
                        options: &task.options,
                        stream: task.stream(),
                        cancel,
                        deadline,
                    })
                    .map_err(failed)
            }
        }
    }
}

/// Persist a completed result when the task asks for it.
///
/// A failed write is logged and does not change the task's outcome.
pub fn save_task_output(task: &Task, value: &Value) {
    let Some(output) = task.output.as_ref().filter(|output| output.save_to_file) else {
        return;
    };
    let path = output.path();
    match write_json(&path, value) {
        Ok(()) => info!(task_id = %task.task_id, path = %path.display(), "saved task output"),
        Err(err) => warn!(
            task_id = %task.task_id,
            path = %path.display(),
            error = %format!("{err:#}"),
            "failed to save task output"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs batches of tasks in order, accumulating results.
#[derive(Debug)]
pub struct TaskManager {
    runner: TaskRunner,
    results: TaskResults,
    cancel: CancelToken,
    task_timeout: Option<Duration>,
}

impl TaskManager {
    pub fn new(components: Arc<Components>) -> Self {
        Self {
            runner: TaskRunner::new(components),
            results: TaskResults::new(),
            cancel: CancelToken::new(),
            task_timeout: None,
        }
    }

    /// Give every task a deadline; `options.timeout_secs` still wins per task.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Execute `tasks` one after another in slice order.
    ///
    /// Each completed result is visible to later tasks of the same batch.
    /// Failures are reported and the batch continues.
    pub fn execute_tasks(&mut self, tasks: &[Task]) -> Vec<TaskReport> {
        let mut reports = Vec::with_capacity(tasks.len());
        for task in tasks {
            let deadline = task
                .timeout_override()
                .or(self.task_timeout)
                .and_then(deadline_after);
            let outcome = self
                .runner
                .run_task(task, &self.results, &self.cancel, deadline);
            if let TaskOutcome::Completed(value) = &outcome {
                save_task_output(task, value);
                self.results.insert(task.task_id.clone(), value.clone());
            }
            reports.push(TaskReport {
                task_id: task.task_id.clone(),
                outcome,
            });
        }
        reports
    }

    pub fn results(&self) -> &TaskResults {
        &self.results
    }

    pub fn into_results(self) -> TaskResults {
        self.results
    }
}
