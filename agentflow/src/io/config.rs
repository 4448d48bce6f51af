//! Runtime settings stored in `agentflow.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::task::MAX_TIMEOUT_SECS;

pub const DEFAULT_SETTINGS_FILE: &str = "agentflow.toml";

/// Runtime settings (TOML).
///
/// Edited by humans; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Worker threads per scheduling round.
    pub max_workers: usize,

    /// Wall-clock budget per task, unless a task sets `options.timeout_secs`.
    pub task_timeout_secs: u64,

    /// Agent used by the planner. Defaults to the first configured agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planner_agent: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_workers: 4,
            task_timeout_secs: 300,
            planner_agent: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(anyhow!("max_workers must be > 0"));
        }
        if self.task_timeout_secs == 0 || self.task_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(anyhow!(
                "task_timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            ));
        }
        if self
            .planner_agent
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(anyhow!("planner_agent must not be blank"));
        }
        Ok(())
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("invalid settings {}", path.display()))?;
    Ok(settings)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings).context("serialize settings toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp settings {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace settings {}", path.display()))?;
    Ok(())
}
