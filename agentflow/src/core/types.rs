//! Shared deterministic types for task execution.
//!
//! These types define the contract between the task runner, the status
//! tracker and the scheduler. They carry no I/O.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Why a task did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FailureReason {
    /// Skipped before execution: unknown plugin/agent/tool/command or bad dispatch.
    Misconfigured(String),
    /// The plugin or command returned an error.
    Execution(String),
    /// A dependency failed, so the task was never attempted.
    Cascade { dependency: String },
    /// The worker did not report before the task deadline.
    TimedOut { millis: u64 },
    /// The worker thread panicked.
    Panicked(String),
}

impl FailureReason {
    pub fn timed_out(timeout: Duration) -> Self {
        FailureReason::TimedOut {
            millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Misconfigured(msg) => write!(f, "skipped: {msg}"),
            FailureReason::Execution(msg) => write!(f, "execution failed: {msg}"),
            FailureReason::Cascade { dependency } => {
                write!(f, "dependency '{dependency}' failed")
            }
            FailureReason::TimedOut { millis } => {
                write!(f, "timed out after {:?}", Duration::from_millis(*millis))
            }
            FailureReason::Panicked(msg) => write!(f, "worker panicked: {msg}"),
        }
    }
}

/// Result of executing a single task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(Value),
    Failed(FailureReason),
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Completed(_) => TaskStatus::Completed,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
        }
    }
}

/// Outcome of one task in a sequential batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub task_id: String,
    pub outcome: TaskOutcome,
}

/// A failed task and the reason, for end-of-run reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub task_id: String,
    pub reason: FailureReason,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).expect("serialize"),
            json!("in_progress")
        );
    }

    #[test]
    fn failure_reason_serializes_tagged() {
        let reason = FailureReason::Cascade {
            dependency: "t1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&reason).expect("serialize"),
            json!({"kind": "cascade", "detail": {"dependency": "t1"}})
        );
        assert_eq!(reason.to_string(), "dependency 't1' failed");
    }

    #[test]
    fn sub_second_timeouts_keep_their_length() {
        let reason = FailureReason::timed_out(Duration::from_millis(250));
        assert_eq!(reason, FailureReason::TimedOut { millis: 250 });
        assert_eq!(reason.to_string(), "timed out after 250ms");
    }
}
