//! Project scaffolding: a sample pipeline plus default settings.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{DEFAULT_SETTINGS_FILE, Settings, write_settings};

pub const DEFAULT_PIPELINE_FILE: &str = "pipeline.json";

const SAMPLE_PIPELINE: &str = include_str!("templates/pipeline.json");

/// Canonical file locations for a project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub pipeline_path: PathBuf,
    pub settings_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            pipeline_path: root.join(DEFAULT_PIPELINE_FILE),
            settings_path: root.join(DEFAULT_SETTINGS_FILE),
            root,
        }
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing files.
    pub force: bool,
}

/// Write `pipeline.json` and `agentflow.toml` into `root`.
///
/// Fails if either file exists unless `options.force` is set.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<ProjectPaths> {
    let paths = ProjectPaths::new(root);
    if !options.force {
        for path in [&paths.pipeline_path, &paths.settings_path] {
            if path.exists() {
                return Err(anyhow!(
                    "init: {} already exists (use --force to overwrite)",
                    path.display()
                ));
            }
        }
    }

    fs::create_dir_all(&paths.root)
        .with_context(|| format!("create directory {}", paths.root.display()))?;
    fs::write(&paths.pipeline_path, SAMPLE_PIPELINE)
        .with_context(|| format!("write file {}", paths.pipeline_path.display()))?;
    write_settings(&paths.settings_path, &Settings::default())?;

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_settings;
    use crate::io::pipeline::load_pipeline;

    #[test]
    fn init_writes_a_loadable_project() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");

        let pipeline = load_pipeline(&paths.pipeline_path).expect("sample pipeline is valid");
        assert_eq!(pipeline.tasks.len(), 2);
        pipeline.plan(false).expect("sample plan is valid");
        assert_eq!(
            load_settings(&paths.settings_path).expect("settings"),
            Settings::default()
        );
    }

    #[test]
    fn init_without_force_refuses_existing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_project(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_project(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_restores_sample() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.pipeline_path, "custom").expect("write custom");

        init_project(temp.path(), &InitOptions { force: true }).expect("re-init");

        assert_eq!(
            fs::read_to_string(&paths.pipeline_path).expect("read"),
            SAMPLE_PIPELINE
        );
    }
}
