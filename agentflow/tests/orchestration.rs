//! End-to-end orchestration scenarios driven through the library.
//!
//! These tests wire scripted plugins into real components and run plans
//! through both the sequential task manager and the parallel scheduler.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use agentflow::core::resolver::TaskResults;
use agentflow::core::status::StatusTracker;
use agentflow::core::types::{FailureReason, TaskOutcome, TaskStatus};
use agentflow::io::pipeline::{is_valid_config, validate_config};
use agentflow::plan::Plan;
use agentflow::scheduler::{Scheduler, SchedulerConfig, StopReason};
use agentflow::task::OutputConfig;
use agentflow::task_manager::{TaskManager, TaskRunner};
use agentflow::test_support::{ScriptedPlugin, components_with, plugin_task, plugin_task_after};
use serde_json::{Value, json};

fn scheduler(plugin: Arc<ScriptedPlugin>, max_workers: usize) -> Scheduler {
    Scheduler::new(
        TaskRunner::new(components_with(plugin)),
        SchedulerConfig {
            max_workers,
            task_timeout: Duration::from_secs(10),
        },
    )
}

/// T2's prompt is T1's placeholder; the plugin answers "R1" then "R2".
#[test]
fn placeholder_carries_result_into_dependent_task() {
    let plugin = Arc::new(ScriptedPlugin::returning([json!("R1"), json!("R2")]));
    let mut manager = TaskManager::new(components_with(plugin.clone()));
    let tasks = vec![
        plugin_task("T1", json!({"prompt": "First step"})),
        plugin_task("T2", json!({"prompt": "{{tasks.T1.output}}"})),
    ];

    manager.execute_tasks(&tasks);

    let mut expected = TaskResults::new();
    expected.insert("T1", json!("R1"));
    expected.insert("T2", json!("R2"));
    assert_eq!(manager.results(), &expected);
    assert_eq!(plugin.calls()[1].input["prompt"], json!("R1"));
}

/// Same scenario through the scheduler: T2 runs a round after T1.
#[test]
fn scheduler_resolves_placeholders_across_rounds() {
    let plugin = Arc::new(ScriptedPlugin::returning([json!("R1"), json!("R2")]));
    let plan = Plan::with_inferred_dependencies(vec![
        plugin_task("T1", json!({"prompt": "First step"})),
        plugin_task("T2", json!({"prompt": "{{tasks.T1.output}}"})),
    ])
    .expect("plan");

    let outcome = scheduler(plugin.clone(), 4).run(&plan);

    assert!(outcome.is_success());
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.results.get("T1"), Some(&json!("R1")));
    assert_eq!(outcome.results.get("T2"), Some(&json!("R2")));
    assert_eq!(plugin.calls()[1].input["prompt"], json!("R1"));
}

/// T1 raises; T2 depends on T1 and must never reach the plugin.
#[test]
fn failed_dependency_is_never_executed() {
    let plugin = Arc::new(ScriptedPlugin::failing("provider unavailable"));
    let plan = Plan::new(vec![
        plugin_task("T1", json!({"prompt": "x"})),
        plugin_task_after("T2", json!({"prompt": "{{tasks.T1.output}}"}), &["T1"]),
    ])
    .expect("plan");

    let outcome = scheduler(plugin.clone(), 2).run(&plan);

    assert_eq!(outcome.statuses["T1"], TaskStatus::Failed);
    assert_eq!(outcome.statuses["T2"], TaskStatus::Failed);
    assert_eq!(plugin.calls().len(), 1);
    assert_eq!(plugin.called_for("T2"), 0);
}

/// A chain declared in reverse order still cascades in one pass.
#[test]
fn cascade_follows_chains_regardless_of_order() {
    let plugin = Arc::new(ScriptedPlugin::failing("boom"));
    let plan = Plan::new(vec![
        plugin_task_after("d", json!({}), &["c"]),
        plugin_task_after("c", json!({}), &["b"]),
        plugin_task_after("b", json!({}), &["a"]),
        plugin_task("a", json!({})),
    ])
    .expect("plan");

    let outcome = scheduler(plugin.clone(), 2).run(&plan);

    assert_eq!(outcome.rounds, 1);
    assert!(outcome.statuses.values().all(|s| *s == TaskStatus::Failed));
    assert_eq!(plugin.calls().len(), 1);
    let causes: Vec<_> = outcome
        .failures
        .iter()
        .map(|f| (f.task_id.as_str(), f.reason.clone()))
        .collect();
    assert_eq!(
        causes[0],
        ("d", FailureReason::Cascade { dependency: "c".into() })
    );
    assert_eq!(causes[3], ("a", FailureReason::Execution("boom".into())));
}

/// Siblings in one round see the snapshot from round start, never each other.
#[test]
fn same_round_tasks_are_isolated() {
    let plugin = Arc::new(ScriptedPlugin::sleeping(Duration::ZERO));
    let plan = Plan::new(vec![
        plugin_task("left", json!({"prompt": "L"})),
        plugin_task("right", json!({"prompt": "{{tasks.left.output}}"})),
    ])
    .expect("plan");

    let outcome = scheduler(plugin.clone(), 4).run(&plan);

    assert_eq!(outcome.rounds, 1);
    assert_eq!(
        outcome.results.get("right"),
        Some(&json!("{{tasks.left.output}}"))
    );
}

/// Unrelated work keeps going when one task times out.
#[test]
fn timeout_fails_only_the_slow_task() {
    let plugin = Arc::new(ScriptedPlugin::sleeping(Duration::from_millis(1500)));
    let mut strict = plugin_task("strict", json!({"prompt": "strict"}));
    strict.options.insert("timeout_secs".into(), json!(1));
    let relaxed = plugin_task("relaxed", json!({"prompt": "relaxed"}));
    let plan = Plan::new(vec![strict, relaxed]).expect("plan");

    let outcome = scheduler(plugin, 2).run(&plan);

    assert_eq!(outcome.statuses["strict"], TaskStatus::Failed);
    assert_eq!(
        outcome.failures[0].reason,
        FailureReason::TimedOut { millis: 1000 }
    );
    assert_eq!(outcome.statuses["relaxed"], TaskStatus::Completed);
    assert_eq!(outcome.results.get("relaxed"), Some(&json!("relaxed")));
    assert!(outcome.results.get("strict").is_none());
}

#[test]
fn saved_output_round_trips() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("outputs/t1.json");
    let plugin = Arc::new(ScriptedPlugin::returning([json!({"title": "Cats", "lines": 4})]));
    let mut task = plugin_task("T1", json!({"prompt": "x"}));
    task.output = Some(OutputConfig {
        save_to_file: true,
        file_path: Some(path.clone()),
    });
    let plan = Plan::new(vec![task]).expect("plan");

    let outcome = scheduler(plugin, 1).run(&plan);

    let saved: Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(Some(&saved), outcome.results.get("T1"));
}

#[test]
fn stalled_and_finished_are_distinct() {
    let plugin = Arc::new(ScriptedPlugin::returning([json!("done")]));
    let plan = Plan::new(vec![
        plugin_task("external", json!({})),
        plugin_task_after("next", json!({}), &["external"]),
    ])
    .expect("plan");

    let mut tracker = StatusTracker::new(&plan);
    tracker.set_status("external", TaskStatus::InProgress);
    let stalled = scheduler(plugin.clone(), 1).resume(&plan, tracker, TaskResults::new());
    assert_eq!(
        stalled.stop,
        StopReason::Stalled {
            pending: vec!["next".to_string()]
        }
    );

    let mut tracker = StatusTracker::new(&plan);
    tracker.set_status("external", TaskStatus::Completed);
    let mut results = TaskResults::new();
    results.insert("external", json!("given"));
    let finished = scheduler(plugin, 1).resume(&plan, tracker, results);
    assert_eq!(finished.stop, StopReason::Finished);
    assert_eq!(finished.results.get("next"), Some(&json!("done")));
}

#[test]
fn sequential_batch_reports_every_task() {
    let plugin = Arc::new(ScriptedPlugin::failing("nope"));
    let mut manager = TaskManager::new(components_with(plugin));
    let reports = manager.execute_tasks(&[
        plugin_task("a", json!({})),
        plugin_task("b", json!({})),
    ]);
    assert_eq!(reports.len(), 2);
    assert!(
        reports
            .iter()
            .all(|r| matches!(r.outcome, TaskOutcome::Failed(FailureReason::Execution(_))))
    );
}

/// Missing `tasks` fails validation; the complete document passes.
#[test]
fn pipeline_schema_requires_tasks() {
    let valid = json!({
        "agents": [{"name": "a", "module": "echo", "class": "EchoAgent", "source": "local", "config": {}}],
        "plugins": [{"name": "p", "module": "text_generation", "source": "local"}],
        "tools": [],
        "tasks": [{"task_id": "t", "plugin": "p", "agent": "a", "input": {"prompt": "hi"}}]
    });
    assert!(is_valid_config(&valid));
    assert!(validate_config(&valid).is_ok());

    let mut missing = valid.clone();
    missing.as_object_mut().expect("object").remove("tasks");
    assert!(!is_valid_config(&missing));
    assert!(validate_config(&missing).is_err());
}
