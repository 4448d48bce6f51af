//! Round-based parallel execution of a plan.
//!
//! Each round takes the runnable frontier, runs it on a bounded set of worker
//! threads and waits for every task to report or time out. Workers see an
//! immutable snapshot of the results table taken at round start. Results and
//! statuses are written only at the end of the round, by the scheduler, from
//! the outcomes received over a channel.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::resolver::TaskResults;
use crate::core::status::StatusTracker;
use crate::core::types::{FailureReason, TaskFailure, TaskOutcome, TaskStatus};
use crate::io::config::Settings;
use crate::plan::Plan;
use crate::task::{Task, deadline_after};
use crate::task_manager::{TaskRunner, save_task_output};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_workers: usize,
    /// Deadline for tasks without `options.timeout_secs`.
    pub task_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SchedulerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            max_workers: settings.max_workers,
            task_timeout: settings.task_timeout(),
        }
    }
}

/// Why the scheduling loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum StopReason {
    /// No task is left pending.
    Finished,
    /// Tasks are still pending but none can become runnable.
    Stalled { pending: Vec<String> },
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub rounds: usize,
    pub statuses: BTreeMap<String, TaskStatus>,
    pub results: TaskResults,
    /// Failed tasks in plan order, cascades included.
    pub failures: Vec<TaskFailure>,
    pub stop: StopReason,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.stop == StopReason::Finished
    }
}

pub struct Scheduler {
    runner: Arc<TaskRunner>,
    config: SchedulerConfig,
}

struct InFlight {
    task_id: String,
    deadline: Option<Instant>,
    timeout: Duration,
    cancel: CancelToken,
}

impl Scheduler {
    pub fn new(runner: TaskRunner, config: SchedulerConfig) -> Self {
        Self {
            runner: Arc::new(runner),
            config: SchedulerConfig {
                max_workers: config.max_workers.max(1),
                ..config
            },
        }
    }

    /// Run `plan` from scratch: every task pending, no results.
    pub fn run(&self, plan: &Plan) -> RunOutcome {
        self.resume(plan, StatusTracker::new(plan), TaskResults::new())
    }

    /// Continue a run from existing statuses and results.
    #[instrument(skip_all, fields(tasks = plan.len(), max_workers = self.config.max_workers))]
    pub fn resume(
        &self,
        plan: &Plan,
        mut tracker: StatusTracker,
        mut results: TaskResults,
    ) -> RunOutcome {
        let mut reasons: HashMap<String, FailureReason> = HashMap::new();
        let mut rounds = 0;

        loop {
            let runnable: Vec<Task> = tracker.runnable_set(plan).into_iter().cloned().collect();
            if runnable.is_empty() {
                break;
            }
            rounds += 1;
            info!(round = rounds, runnable = runnable.len(), "starting round");
            for task in &runnable {
                tracker.set_status(&task.task_id, TaskStatus::InProgress);
            }

            let snapshot = Arc::new(results.clone());
            let outcomes = self.run_round(&runnable, &snapshot);

            for (task, outcome) in runnable.iter().zip(outcomes) {
                match outcome {
                    TaskOutcome::Completed(value) => {
                        save_task_output(task, &value);
                        results.insert(task.task_id.clone(), value);
                        tracker.set_status(&task.task_id, TaskStatus::Completed);
                    }
                    TaskOutcome::Failed(reason) => {
                        tracker.set_status(&task.task_id, TaskStatus::Failed);
                        reasons.insert(task.task_id.clone(), reason);
                    }
                }
            }
        }

        let pending = tracker.pending(plan);
        let stop = if pending.is_empty() {
            StopReason::Finished
        } else {
            warn!(pending = ?pending, "run stalled with pending tasks");
            StopReason::Stalled { pending }
        };
        let failures = collect_failures(plan, &tracker, &mut reasons);
        info!(
            rounds,
            completed = tracker.with_status(plan, TaskStatus::Completed).len(),
            failed = failures.len(),
            "run finished"
        );

        RunOutcome {
            rounds,
            statuses: tracker.snapshot(),
            results,
            failures,
            stop,
        }
    }

    /// Execute one round; the returned outcomes are in `tasks` order.
    fn run_round(&self, tasks: &[Task], snapshot: &Arc<TaskResults>) -> Vec<TaskOutcome> {
        let (tx, rx) = mpsc::channel::<(usize, TaskOutcome)>();
        let mut queue: VecDeque<(usize, &Task)> = tasks.iter().enumerate().collect();
        let mut in_flight: HashMap<usize, InFlight> = HashMap::new();
        let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; tasks.len()];

        loop {
            while in_flight.len() < self.config.max_workers
                && let Some((index, task)) = queue.pop_front()
            {
                match self.spawn_worker(index, task, snapshot, &tx) {
                    Ok(flight) => {
                        in_flight.insert(index, flight);
                    }
                    Err(reason) => outcomes[index] = Some(TaskOutcome::Failed(reason)),
                }
            }
            if in_flight.is_empty() {
                break;
            }

            let received = match in_flight.values().filter_map(|flight| flight.deadline).min() {
                Some(next_deadline) => {
                    rx.recv_timeout(next_deadline.saturating_duration_since(Instant::now()))
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((index, outcome)) => {
                    if in_flight.remove(&index).is_some() {
                        outcomes[index] = Some(outcome);
                    } else {
                        debug!(index, "discarding late report");
                    }
                }
                // The scheduler holds a sender, so the channel never disconnects.
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    let now = Instant::now();
                    let expired: Vec<usize> = in_flight
                        .iter()
                        .filter(|(_, flight)| flight.deadline.is_some_and(|d| d <= now))
                        .map(|(index, _)| *index)
                        .collect();
                    for index in expired {
                        if let Some(flight) = in_flight.remove(&index) {
                            flight.cancel.cancel();
                            warn!(
                                task_id = %flight.task_id,
                                timeout = ?flight.timeout,
                                "task timed out"
                            );
                            outcomes[index] =
                                Some(TaskOutcome::Failed(FailureReason::timed_out(flight.timeout)));
                        }
                    }
                }
            }
        }

        outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| {
                    TaskOutcome::Failed(FailureReason::Execution("worker did not report".into()))
                })
            })
            .collect()
    }

    fn spawn_worker(
        &self,
        index: usize,
        task: &Task,
        snapshot: &Arc<TaskResults>,
        tx: &mpsc::Sender<(usize, TaskOutcome)>,
    ) -> Result<InFlight, FailureReason> {
        let timeout = task.timeout_override().unwrap_or(self.config.task_timeout);
        let deadline = deadline_after(timeout);
        let cancel = CancelToken::new();

        let runner = Arc::clone(&self.runner);
        let snapshot = Arc::clone(snapshot);
        let worker_task = task.clone();
        let worker_cancel = cancel.clone();
        let tx = tx.clone();
        thread::Builder::new()
            .name(format!("agentflow-{}", task.task_id))
            .spawn(move || {
                let outcome =
                    runner.run_task(&worker_task, &snapshot, &worker_cancel, deadline);
                // The receiver is gone once the round has moved on.
                let _ = tx.send((index, outcome));
            })
            .map_err(|err| FailureReason::Execution(format!("spawn worker: {err}")))?;
        debug!(task_id = %task.task_id, timeout = ?timeout, "dispatched task");

        Ok(InFlight {
            task_id: task.task_id.clone(),
            deadline,
            timeout,
            cancel,
        })
    }
}

fn collect_failures(
    plan: &Plan,
    tracker: &StatusTracker,
    reasons: &mut HashMap<String, FailureReason>,
) -> Vec<TaskFailure> {
    plan.tasks()
        .iter()
        .filter(|task| tracker.status(&task.task_id) == Some(TaskStatus::Failed))
        .filter_map(|task| {
            let reason = reasons.remove(&task.task_id).or_else(|| {
                tracker
                    .cascade_cause(&task.task_id)
                    .map(|dependency| FailureReason::Cascade {
                        dependency: dependency.to_string(),
                    })
            })?;
            Some(TaskFailure {
                task_id: task.task_id.clone(),
                reason,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedPlugin, components_with, plugin_task, plugin_task_after};
    use serde_json::json;

    fn scheduler(plugin: Arc<ScriptedPlugin>, max_workers: usize) -> Scheduler {
        Scheduler::new(
            TaskRunner::new(components_with(plugin)),
            SchedulerConfig {
                max_workers,
                task_timeout: Duration::from_secs(10),
            },
        )
    }

    #[test]
    fn independent_tasks_share_a_round() {
        let plugin = Arc::new(ScriptedPlugin::sleeping(Duration::from_millis(10)));
        let plan = Plan::new(vec![
            plugin_task("a", json!({"prompt": "A"})),
            plugin_task("b", json!({"prompt": "B"})),
            plugin_task("c", json!({"prompt": "C"})),
        ])
        .expect("plan");

        let outcome = scheduler(plugin, 2).run(&plan);

        assert_eq!(outcome.rounds, 1);
        assert!(outcome.is_success());
        assert_eq!(outcome.results.get("c"), Some(&json!("C")));
    }

    #[test]
    fn dependents_wait_for_the_next_round() {
        let plugin = Arc::new(ScriptedPlugin::sleeping(Duration::ZERO));
        let plan = Plan::new(vec![
            plugin_task("first", json!({"prompt": "one"})),
            plugin_task_after("second", json!({"prompt": "{{tasks.first.output}}"}), &["first"]),
        ])
        .expect("plan");

        let outcome = scheduler(plugin.clone(), 4).run(&plan);

        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.results.get("second"), Some(&json!("one")));
        assert_eq!(plugin.calls()[1].input["prompt"], json!("one"));
    }

    #[test]
    fn failure_cascades_without_executing_dependents() {
        let plugin = Arc::new(ScriptedPlugin::failing("boom"));
        let plan = Plan::new(vec![
            plugin_task("T1", json!({})),
            plugin_task_after("T2", json!({}), &["T1"]),
        ])
        .expect("plan");

        let outcome = scheduler(plugin.clone(), 4).run(&plan);

        assert_eq!(outcome.statuses["T1"], TaskStatus::Failed);
        assert_eq!(outcome.statuses["T2"], TaskStatus::Failed);
        assert_eq!(plugin.calls().len(), 1);
        assert_eq!(
            outcome.failures,
            vec![
                TaskFailure {
                    task_id: "T1".into(),
                    reason: FailureReason::Execution("boom".into()),
                },
                TaskFailure {
                    task_id: "T2".into(),
                    reason: FailureReason::Cascade {
                        dependency: "T1".into()
                    },
                },
            ]
        );
        assert_eq!(outcome.stop, StopReason::Finished);
    }

    #[test]
    fn slow_task_times_out_and_is_cancelled() {
        let plugin = Arc::new(ScriptedPlugin::sleeping(Duration::from_secs(5)));
        let mut slow = plugin_task("slow", json!({"prompt": "zzz"}));
        slow.options.insert("timeout_secs".into(), json!(1));
        let plan = Plan::new(vec![slow]).expect("plan");

        let started = Instant::now();
        let outcome = scheduler(plugin, 1).run(&plan);

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(
            outcome.failures[0].reason,
            FailureReason::TimedOut { millis: 1000 }
        );
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn oversized_timeouts_do_not_break_the_round() {
        let plugin = Arc::new(ScriptedPlugin::returning([json!("R")]));
        let mut task = plugin_task("t", json!({"prompt": "x"}));
        task.options.insert("timeout_secs".into(), json!(u64::MAX));
        let plan = Plan::new(vec![task]).expect("plan");

        let scheduler = Scheduler::new(
            TaskRunner::new(components_with(plugin)),
            SchedulerConfig {
                max_workers: 1,
                task_timeout: Duration::MAX,
            },
        );
        let outcome = scheduler.run(&plan);

        assert!(outcome.is_success());
        assert_eq!(outcome.results.get("t"), Some(&json!("R")));
    }

    #[test]
    fn stalled_run_reports_pending_tasks() {
        let plugin = Arc::new(ScriptedPlugin::returning([]));
        let plan = Plan::new(vec![
            plugin_task("stuck", json!({})),
            plugin_task_after("waiting", json!({}), &["stuck"]),
        ])
        .expect("plan");
        let mut tracker = StatusTracker::new(&plan);
        tracker.set_status("stuck", TaskStatus::InProgress);

        let outcome = scheduler(plugin.clone(), 2).resume(&plan, tracker, TaskResults::new());

        assert_eq!(outcome.rounds, 0);
        assert_eq!(
            outcome.stop,
            StopReason::Stalled {
                pending: vec!["waiting".to_string()]
            }
        );
        assert!(!outcome.is_success());
        assert!(plugin.calls().is_empty());
    }
}
