//! Placeholder resolution against the task results table.
//!
//! A string value that is exactly `{{tasks.<id>.output}}` is replaced by the
//! recorded result of task `<id>`. Anything else, including placeholders
//! embedded in longer strings, passes through untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{\s*tasks\.([^.{}]+?)\.output\s*\}\}$").expect("placeholder regex is valid")
});

/// Results recorded so far, keyed by task id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskResults {
    entries: BTreeMap<String, Value>,
}

impl TaskResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result; re-running the same id overwrites.
    pub fn insert(&mut self, task_id: impl Into<String>, value: Value) {
        self.entries.insert(task_id.into(), value);
    }

    pub fn get(&self, task_id: &str) -> Option<&Value> {
        self.entries.get(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.entries
    }
}

/// The task id a placeholder string refers to, if `s` is exactly one placeholder.
///
/// Ids may contain inner whitespace; whitespace around the id is not part of it.
pub fn placeholder_target(s: &str) -> Option<&str> {
    PLACEHOLDER_RE
        .captures(s)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|id| !id.is_empty())
}

/// Return a copy of `value` with every resolvable placeholder substituted.
pub fn resolve_value(value: &Value, results: &TaskResults) -> Value {
    match value {
        Value::Object(map) => Value::Object(resolve_map(map, results)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_value(item, results))
                .collect(),
        ),
        Value::String(s) => resolve_string(s, results),
        other => other.clone(),
    }
}

/// Resolve every value of a task input map.
pub fn resolve_map(map: &Map<String, Value>, results: &TaskResults) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, results)))
        .collect()
}

fn resolve_string(s: &str, results: &TaskResults) -> Value {
    let Some(target) = placeholder_target(s) else {
        return Value::String(s.to_string());
    };
    match results.get(target) {
        Some(found) => {
            debug!(task_id = target, "resolved input from previous task");
            found.clone()
        }
        None => {
            warn!(
                task_id = target,
                "could not resolve reference; it may not have been executed yet"
            );
            Value::String(s.to_string())
        }
    }
}

/// Task ids referenced by placeholders anywhere inside `value`.
pub fn referenced_tasks(value: &Value) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    collect_references(value, &mut found);
    found
}

fn collect_references(value: &Value, found: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for item in map.values() {
                collect_references(item, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, found);
            }
        }
        Value::String(s) => {
            if let Some(target) = placeholder_target(s) {
                found.insert(target.to_string());
            }
        }
        _ => {}
    }
}
