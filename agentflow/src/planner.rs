//! Goal → task graph via a single agent chat call.

use std::sync::{Arc, LazyLock};

use jsonschema::{Validator, validator_for};
use regex::Regex;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::agents::{Agent, ChatMessage, GenerateOptions, Generation};
use crate::error::PlanError;
use crate::io::prompt::{CommandInfo, render_planner_prompt};
use crate::plan::Plan;
use crate::task::Task;

const PLAN_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/plan.schema.json"
));

static VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).expect("embedded plan schema");
    validator_for(&schema).expect("compile plan schema")
});

static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[\w-]*[ \t]*\r?\n(.*?)\r?\n?[ \t]*```\s*$").expect("valid regex")
});

/// Turns a goal into a validated [`Plan`].
pub struct Planner {
    agent: Arc<dyn Agent>,
}

impl Planner {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    /// Ask the agent for a plan. No retry on a malformed response.
    #[instrument(skip_all, fields(agent = %self.agent.name()))]
    pub fn create_plan(&self, goal: &str, commands: &[CommandInfo]) -> Result<Plan, PlanError> {
        if goal.trim().is_empty() {
            return Err(PlanError::EmptyGoal);
        }
        let prompt = render_planner_prompt(goal, commands).map_err(PlanError::Prompt)?;
        let response = self
            .agent
            .chat(&[ChatMessage::user(prompt)], &GenerateOptions::default())
            .and_then(Generation::into_text)
            .map_err(PlanError::Agent)?;

        let plan = parse_plan(&response)?;
        info!(tasks = plan.len(), "created plan");
        Ok(plan)
    }
}

/// Parse and validate a planner response.
pub fn parse_plan(response: &str) -> Result<Plan, PlanError> {
    let body = strip_code_fence(response);
    let value: Value = serde_json::from_str(body).map_err(|err| {
        warn!(error = %err, "planner response is not JSON");
        PlanError::Parse(err)
    })?;
    if !VALIDATOR.is_valid(&value) {
        let messages = VALIDATOR
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(PlanError::Shape(messages));
    }
    let tasks: Vec<Task> =
        serde_json::from_value(value).map_err(|err| PlanError::Shape(vec![err.to_string()]))?;
    Ok(Plan::new(tasks)?)
}

/// Unwrap a response enclosed in one Markdown code fence.
fn strip_code_fence(response: &str) -> &str {
    match CODE_FENCE_RE.captures(response).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str(),
        None => response.trim(),
    }
}
