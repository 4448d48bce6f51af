//! Per-task lifecycle tracking and runnable-frontier computation.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::core::types::TaskStatus;
use crate::plan::Plan;
use crate::task::Task;

/// Status of every task in a plan, plus the cause of each cascaded failure.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    statuses: HashMap<String, TaskStatus>,
    cascade_causes: BTreeMap<String, String>,
}

impl StatusTracker {
    /// Tracker with every task of `plan` pending.
    pub fn new(plan: &Plan) -> Self {
        let mut tracker = Self::default();
        tracker.initialize(plan);
        tracker
    }

    /// Reset every task of `plan` to pending.
    pub fn initialize(&mut self, plan: &Plan) {
        self.statuses.clear();
        self.cascade_causes.clear();
        for task in plan.tasks() {
            self.statuses
                .insert(task.task_id.clone(), TaskStatus::Pending);
        }
    }

    /// Unconditional overwrite; transitions are not validated.
    pub fn set_status(&mut self, task_id: &str, status: TaskStatus) {
        self.statuses.insert(task_id.to_string(), status);
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.statuses.get(task_id).copied()
    }

    /// Dependency whose failure caused `task_id` to fail, if it cascaded.
    pub fn cascade_cause(&self, task_id: &str) -> Option<&str> {
        self.cascade_causes.get(task_id).map(String::as_str)
    }

    /// Pending tasks whose dependencies have all completed, in plan order.
    ///
    /// Pending tasks with a failed dependency are marked failed first. This
    /// repeats until no more tasks cascade, so whole chains of dependents fail
    /// in one call regardless of their position in the plan.
    pub fn runnable_set<'p>(&mut self, plan: &'p Plan) -> Vec<&'p Task> {
        while self.cascade_failures(plan) {}

        plan.tasks()
            .iter()
            .filter(|task| self.status(&task.task_id) == Some(TaskStatus::Pending))
            .filter(|task| {
                task.dependencies
                    .iter()
                    .all(|dep| self.status(dep) == Some(TaskStatus::Completed))
            })
            .collect()
    }

    /// Ids still pending, in plan order.
    pub fn pending(&self, plan: &Plan) -> Vec<String> {
        self.with_status(plan, TaskStatus::Pending)
    }

    pub fn with_status(&self, plan: &Plan, status: TaskStatus) -> Vec<String> {
        plan.tasks()
            .iter()
            .filter(|task| self.status(&task.task_id) == Some(status))
            .map(|task| task.task_id.clone())
            .collect()
    }

    /// Snapshot of all statuses in deterministic order.
    pub fn snapshot(&self) -> BTreeMap<String, TaskStatus> {
        self.statuses
            .iter()
            .map(|(id, status)| (id.clone(), *status))
            .collect()
    }

    fn cascade_failures(&mut self, plan: &Plan) -> bool {
        let mut changed = false;
        for task in plan.tasks() {
            if self.status(&task.task_id) != Some(TaskStatus::Pending) {
                continue;
            }
            let failed_dep = task
                .dependencies
                .iter()
                .find(|dep| self.status(dep) == Some(TaskStatus::Failed));
            if let Some(dep) = failed_dep {
                debug!(task_id = %task.task_id, dependency = %dep, "cascading failure");
                self.cascade_causes
                    .insert(task.task_id.clone(), dep.clone());
                self.set_status(&task.task_id, TaskStatus::Failed);
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::command_task;

    fn plan_of(specs: &[(&str, &[&str])]) -> Plan {
        let tasks = specs
            .iter()
            .map(|(id, deps)| {
                let mut task = command_task(id, "generate");
                task.dependencies = deps.iter().map(|d| d.to_string()).collect();
                task
            })
            .collect();
        Plan::new(tasks).expect("plan")
    }

    fn ids(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.task_id.clone()).collect()
    }

    #[test]
    fn initialize_marks_every_task_pending() {
        let plan = plan_of(&[("a", &[]), ("b", &["a"])]);
        let tracker = StatusTracker::new(&plan);
        assert_eq!(tracker.status("a"), Some(TaskStatus::Pending));
        assert_eq!(tracker.status("b"), Some(TaskStatus::Pending));
        assert_eq!(tracker.status("missing"), None);
    }

    #[test]
    fn runnable_set_respects_dependencies() {
        let plan = plan_of(&[("a", &[]), ("b", &["a"]), ("c", &[])]);
        let mut tracker = StatusTracker::new(&plan);
        assert_eq!(ids(&tracker.runnable_set(&plan)), vec!["a", "c"]);

        tracker.set_status("a", TaskStatus::InProgress);
        tracker.set_status("c", TaskStatus::Completed);
        assert!(tracker.runnable_set(&plan).is_empty());

        tracker.set_status("a", TaskStatus::Completed);
        assert_eq!(ids(&tracker.runnable_set(&plan)), vec!["b"]);
    }

    #[test]
    fn runnable_set_never_returns_non_pending_tasks() {
        let plan = plan_of(&[("a", &[]), ("b", &[]), ("c", &[])]);
        let mut tracker = StatusTracker::new(&plan);
        tracker.set_status("a", TaskStatus::Completed);
        tracker.set_status("b", TaskStatus::InProgress);
        tracker.set_status("c", TaskStatus::Failed);
        assert!(tracker.runnable_set(&plan).is_empty());
    }

    #[test]
    fn failed_dependency_cascades_through_chain_in_any_order() {
        // Dependents listed before their dependencies still cascade in one call.
        let plan = plan_of(&[("d", &["c"]), ("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        let mut tracker = StatusTracker::new(&plan);
        tracker.set_status("a", TaskStatus::Failed);

        assert!(tracker.runnable_set(&plan).is_empty());
        for id in ["b", "c", "d"] {
            assert_eq!(tracker.status(id), Some(TaskStatus::Failed), "{id}");
        }
        assert_eq!(tracker.cascade_cause("b"), Some("a"));
        assert_eq!(tracker.cascade_cause("d"), Some("c"));
        assert_eq!(tracker.cascade_cause("a"), None);
    }

    #[test]
    fn any_failed_dependency_fails_dependent_even_if_others_pending() {
        let plan = plan_of(&[("a", &[]), ("b", &[]), ("c", &["a", "b"])]);
        let mut tracker = StatusTracker::new(&plan);
        tracker.set_status("b", TaskStatus::Failed);

        let runnable = tracker.runnable_set(&plan);
        assert_eq!(ids(&runnable), vec!["a"]);
        assert_eq!(tracker.status("c"), Some(TaskStatus::Failed));
    }

    #[test]
    fn set_status_is_idempotent() {
        let plan = plan_of(&[("a", &[])]);
        let mut once = StatusTracker::new(&plan);
        once.set_status("a", TaskStatus::Completed);
        let mut twice = StatusTracker::new(&plan);
        twice.set_status("a", TaskStatus::Completed);
        twice.set_status("a", TaskStatus::Completed);
        assert_eq!(once.snapshot(), twice.snapshot());
    }
}
