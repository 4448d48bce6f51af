//! Structural invariants of a task graph: unique ids, known dependencies,
//! and no cycles.

use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;
use crate::task::Task;

/// Check every structural invariant, returning the first violation found.
///
/// Checks run in a fixed order (duplicates, unknown references, cycles) so the
/// reported error is deterministic for a given plan.
pub fn validate_graph(tasks: &[Task]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.task_id.as_str()) {
            return Err(ConfigError::DuplicateTaskId(task.task_id.clone()));
        }
    }

    for task in tasks {
        for dep in &task.dependencies {
            if !seen.contains(dep.as_str()) {
                return Err(ConfigError::UnknownDependency {
                    task_id: task.task_id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    match find_cycle(tasks) {
        Some(cycle) => Err(ConfigError::CyclicDependency(cycle)),
        None => Ok(()),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first search over dependency edges in plan order.
///
/// Returns the cycle as a path that starts and ends with the same id.
pub fn find_cycle(tasks: &[Task]) -> Option<Vec<String>> {
    let index: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| (task.task_id.as_str(), i))
        .collect();
    let mut marks = vec![Mark::Unvisited; tasks.len()];
    let mut stack = Vec::new();

    for start in 0..tasks.len() {
        if marks[start] == Mark::Unvisited
            && let Some(cycle) = visit(start, tasks, &index, &mut marks, &mut stack)
        {
            return Some(cycle);
        }
    }
    None
}

fn visit(
    node: usize,
    tasks: &[Task],
    index: &HashMap<&str, usize>,
    marks: &mut [Mark],
    stack: &mut Vec<usize>,
) -> Option<Vec<String>> {
    marks[node] = Mark::OnStack;
    stack.push(node);

    for dep in &tasks[node].dependencies {
        let Some(&next) = index.get(dep.as_str()) else {
            continue;
        };
        match marks[next] {
            Mark::OnStack => {
                let pos = stack.iter().position(|&n| n == next).unwrap_or(0);
                let mut cycle: Vec<String> = stack[pos..]
                    .iter()
                    .map(|&n| tasks[n].task_id.clone())
                    .collect();
                cycle.push(tasks[next].task_id.clone());
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(next, tasks, index, marks, stack) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }

    stack.pop();
    marks[node] = Mark::Done;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::command_task;

    fn with_deps(id: &str, deps: &[&str]) -> Task {
        let mut task = command_task(id, "generate");
        task.dependencies = deps.iter().map(|d| d.to_string()).collect();
        task
    }

    #[test]
    fn accepts_diamond() {
        let tasks = vec![
            with_deps("a", &[]),
            with_deps("b", &["a"]),
            with_deps("c", &["a"]),
            with_deps("d", &["b", "c"]),
        ];
        validate_graph(&tasks).expect("diamond is acyclic");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let tasks = vec![with_deps("a", &[]), with_deps("a", &[])];
        assert_eq!(
            validate_graph(&tasks),
            Err(ConfigError::DuplicateTaskId("a".to_string()))
        );
    }

    #[test]
    fn rejects_unknown_dependency() {
        let tasks = vec![with_deps("a", &["ghost"])];
        assert_eq!(
            validate_graph(&tasks),
            Err(ConfigError::UnknownDependency {
                task_id: "a".to_string(),
                dependency: "ghost".to_string(),
            })
        );
    }

    #[test]
    fn reports_cycle_path() {
        let tasks = vec![
            with_deps("a", &["c"]),
            with_deps("b", &["a"]),
            with_deps("c", &["b"]),
        ];
        assert_eq!(
            validate_graph(&tasks),
            Err(ConfigError::CyclicDependency(vec![
                "a".to_string(),
                "c".to_string(),
                "b".to_string(),
                "a".to_string(),
            ]))
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let tasks = vec![with_deps("solo", &["solo"])];
        assert_eq!(
            find_cycle(&tasks),
            Some(vec!["solo".to_string(), "solo".to_string()])
        );
    }
}
