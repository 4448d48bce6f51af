use std::collections::HashSet;

use serde_json::Value;

use crate::core::graph::validate_graph;
use crate::core::resolver::referenced_tasks;
use crate::error::ConfigError;
use crate::task::Task;

/// An ordered, validated task graph for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    tasks: Vec<Task>,
}

impl Plan {
    /// Build a plan from tasks whose dependencies are declared explicitly.
    pub fn new(tasks: Vec<Task>) -> Result<Self, ConfigError> {
        for task in &tasks {
            task.dispatch()?;
        }
        validate_graph(&tasks)?;
        Ok(Self { tasks })
    }

    /// Build a plan where every placeholder that names another task of the
    /// same list also counts as a dependency.
    ///
    /// References to ids outside the list are left for the resolver, which
    /// keeps them literal.
    pub fn with_inferred_dependencies(mut tasks: Vec<Task>) -> Result<Self, ConfigError> {
        let ids: HashSet<String> = tasks.iter().map(|t| t.task_id.clone()).collect();
        for task in &mut tasks {
            let refs = referenced_tasks(&Value::Object(task.input.clone()));
            for target in refs {
                if ids.contains(&target) && !task.dependencies.contains(&target) {
                    task.dependencies.push(target);
                }
            }
        }
        Self::new(tasks)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.task_id == task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
