//! Runner settings: how and where job runs execute on this host

use crate::execution::SchedulingStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings of the local runner, loaded from an optional YAML file
///
/// ```yaml
/// shell: [bash, -e, -o, pipefail, -c]
/// work-root: /var/tmp/matrix-ci
/// strategy: parallel-limited
/// max-parallel: 2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RunnerSettings {
    /// Program and leading arguments used to run `run:` scripts; the script is appended
    pub shell: Vec<String>,

    /// Directory holding one subdirectory per pipeline run
    pub work_root: PathBuf,

    /// Source tree checked out by `actions/checkout`
    pub source_dir: PathBuf,

    /// Keep job workspaces after the run
    pub keep_workspaces: bool,

    /// SQLite history database; the platform data dir when unset
    pub history_db: Option<PathBuf>,

    /// `sequential`, `parallel` or `parallel-limited`
    pub strategy: String,

    /// Concurrency bound for `parallel-limited`
    pub max_parallel: usize,

    /// Timeout for steps whose workflow declares none
    pub step_timeout_secs: Option<u64>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            shell: vec!["sh".to_string(), "-e".to_string(), "-c".to_string()],
            work_root: default_work_root(),
            source_dir: PathBuf::from("."),
            keep_workspaces: false,
            history_db: None,
            strategy: "parallel".to_string(),
            max_parallel: 4,
            step_timeout_secs: None,
        }
    }
}

fn default_work_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("matrix-ci")
        .join("runs")
}

impl RunnerSettings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string; missing keys keep their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: RunnerSettings =
            serde_yaml::from_str(yaml).context("Invalid settings YAML")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from the given path, or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.shell.is_empty() {
            anyhow::bail!("shell must name a program");
        }
        if self.max_parallel == 0 {
            anyhow::bail!("max-parallel must be positive");
        }
        if self.step_timeout_secs == Some(0) {
            anyhow::bail!("step-timeout-secs must be positive");
        }
        self.scheduling_strategy()?;
        Ok(())
    }

    /// Scheduling strategy named by `strategy`
    pub fn scheduling_strategy(&self) -> Result<SchedulingStrategy> {
        match self.strategy.as_str() {
            "sequential" => Ok(SchedulingStrategy::Sequential),
            "parallel" => Ok(SchedulingStrategy::Parallel),
            "parallel-limited" => Ok(SchedulingStrategy::LimitedParallel(self.max_parallel)),
            other => anyhow::bail!("Unknown scheduling strategy '{}'", other),
        }
    }
}
