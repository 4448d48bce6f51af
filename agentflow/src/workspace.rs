//! A loaded project: pipeline document, settings and instantiated components.
//!
//! This is the glue the CLI commands share. It hands out planners, task
//! managers and schedulers wired to the same components and settings.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::agents::Agent;
use crate::io::config::{Settings, load_settings};
use crate::io::pipeline::{PipelineConfig, load_pipeline};
use crate::io::prompt::CommandInfo;
use crate::plan::Plan;
use crate::planner::Planner;
use crate::registry::{Components, Factories};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::task_manager::{TaskManager, TaskRunner};

#[derive(Debug)]
pub struct Workspace {
    pub pipeline: PipelineConfig,
    pub settings: Settings,
    components: Arc<Components>,
}

impl Workspace {
    /// Load both files and build every component with `factories`.
    pub fn load(pipeline_path: &Path, settings_path: &Path, factories: &Factories) -> Result<Self> {
        let pipeline = load_pipeline(pipeline_path)?;
        let settings = load_settings(settings_path)?;
        Self::from_parts(pipeline, settings, factories)
    }

    /// Build from an already-validated pipeline and settings.
    ///
    /// `settings.planner_agent`, when set, becomes the default agent for the
    /// planner and for commands that do not name one.
    pub fn from_parts(
        pipeline: PipelineConfig,
        settings: Settings,
        factories: &Factories,
    ) -> Result<Self> {
        settings.validate()?;
        let mut components =
            Components::from_pipeline(&pipeline, factories).context("load components")?;
        if let Some(name) = settings.planner_agent.as_deref() {
            components
                .set_default_agent(name)
                .context("planner_agent")?;
        }
        Ok(Self {
            pipeline,
            settings,
            components: Arc::new(components),
        })
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    /// The pipeline's own task list as a plan; placeholders imply dependencies.
    pub fn configured_plan(&self) -> Result<Plan> {
        self.pipeline
            .plan(true)
            .context("invalid task list in pipeline")
    }

    /// Commands the planner may use, sorted by name.
    pub fn command_catalog(&self) -> Vec<CommandInfo> {
        self.components
            .commands
            .iter()
            .map(|(name, command)| CommandInfo::new(name, command.description()))
            .collect()
    }

    /// The named agent, or the default agent when `name` is `None`.
    pub fn agent(&self, name: Option<&str>) -> Result<Arc<dyn Agent>> {
        let name = match name {
            Some(name) => name,
            None => self
                .components
                .default_agent()
                .ok_or_else(|| anyhow!("no agent configured"))?,
        };
        Ok(self.components.agents.require(name)?)
    }

    pub fn planner(&self) -> Result<Planner> {
        let agent = self.agent(None).context("planner agent")?;
        info!(agent = agent.name(), "using planner agent");
        Ok(Planner::new(agent))
    }

    /// Decompose `goal` into a plan with the planner agent.
    pub fn plan_goal(&self, goal: &str) -> Result<Plan> {
        let plan = self
            .planner()?
            .create_plan(goal, &self.command_catalog())
            .context("create plan")?;
        Ok(plan)
    }

    pub fn task_manager(&self) -> TaskManager {
        TaskManager::new(Arc::clone(&self.components)).with_task_timeout(self.settings.task_timeout())
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            TaskRunner::new(Arc::clone(&self.components)),
            SchedulerConfig::from(&self.settings),
        )
    }
}
