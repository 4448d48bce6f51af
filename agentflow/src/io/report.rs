//! Run report artifact written by `agentflow run --report`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use super::output::write_json;
use crate::core::types::{TaskFailure, TaskStatus};
use crate::scheduler::{RunOutcome, StopReason};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub rounds: usize,
    pub stop: StopReason,
    pub duration_ms: u64,
    pub statuses: BTreeMap<String, TaskStatus>,
    pub results: BTreeMap<String, Value>,
    pub failures: Vec<TaskFailure>,
}

impl RunReport {
    pub fn new(outcome: &RunOutcome, goal: Option<&str>, elapsed: Duration) -> Self {
        Self {
            goal: goal.map(str::to_string),
            rounds: outcome.rounds,
            stop: outcome.stop.clone(),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            statuses: outcome.statuses.clone(),
            results: outcome.results.clone().into_map(),
            failures: outcome.failures.clone(),
        }
    }
}

pub fn write_run_report(path: &Path, report: &RunReport) -> Result<()> {
    write_json(path, report)
}
