//! Planner prompt rendering.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");

/// A command the planner may use, as listed in the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
}

impl CommandInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)?;
        Ok(Self { env })
    }

    fn render_planner(&self, goal: &str, commands: &[CommandInfo]) -> Result<String> {
        let template = self.env.get_template("planner")?;
        let rendered = template.render(context! {
            goal => goal.trim(),
            commands => commands,
        })?;
        Ok(rendered)
    }
}

/// Render the prompt asking an agent to decompose `goal` into tasks.
pub fn render_planner_prompt(goal: &str, commands: &[CommandInfo]) -> Result<String> {
    let rendered = PromptEngine::new()?.render_planner(goal, commands)?;
    debug!(bytes = rendered.len(), commands = commands.len(), "rendered planner prompt");
    Ok(rendered)
}
