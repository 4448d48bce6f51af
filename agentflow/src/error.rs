//! Error taxonomy shared by the pipeline loader, planner and registry.
//!
//! Task-level failures are not errors: they are reported as
//! [`FailureReason`](crate::core::types::FailureReason) values so a single bad
//! task never aborts a batch or a scheduling round.

use thiserror::Error;

/// Malformed pipeline or plan structure, or an unresolvable component reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("schema validation failed:\n- {}", .0.join("\n- "))]
    Schema(Vec<String>),

    #[error("duplicate task id '{0}'")]
    DuplicateTaskId(String),

    #[error("task '{task_id}' depends on unknown task '{dependency}'")]
    UnknownDependency { task_id: String, dependency: String },

    #[error("cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("task '{task_id}': {reason}")]
    InvalidDispatch { task_id: String, reason: String },

    #[error("duplicate {kind} name '{name}'")]
    DuplicateComponent { kind: ComponentKind, name: String },

    #[error("{kind} '{name}': unknown module '{module}'")]
    UnknownModule {
        kind: ComponentKind,
        name: String,
        module: String,
    },

    #[error("{kind} '{name}': remote sources are not supported, build it into the registry")]
    RemoteSource { kind: ComponentKind, name: String },

    #[error("{kind} '{name}' not found")]
    MissingComponent { kind: ComponentKind, name: String },

    #[error("{kind} '{name}': {reason}")]
    InvalidComponent {
        kind: ComponentKind,
        name: String,
        reason: String,
    },
}

/// Failure to turn a goal into a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("goal must not be empty")]
    EmptyGoal,

    #[error("render planner prompt")]
    Prompt(#[source] anyhow::Error),

    #[error("planner agent failed")]
    Agent(#[source] anyhow::Error),

    #[error("planner response is not valid JSON")]
    Parse(#[source] serde_json::Error),

    #[error("planner response has the wrong shape:\n- {}", .0.join("\n- "))]
    Shape(Vec<String>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Kind of a named component, used in error messages and registry lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Agent,
    Plugin,
    Tool,
    Command,
}

impl ComponentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Agent => "agent",
            ComponentKind::Plugin => "plugin",
            ComponentKind::Tool => "tool",
            ComponentKind::Command => "command",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = ConfigError::CyclicDependency(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn plan_error_wraps_config_error_transparently() {
        let err: PlanError = ConfigError::DuplicateTaskId("t1".into()).into();
        assert_eq!(err.to_string(), "duplicate task id 't1'");
    }
}
