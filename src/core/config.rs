//! Workflow configuration from YAML

use crate::core::{
    matrix::StrategyConfig,
    trigger::{TriggerConfig, TriggerFilter},
    Workflow,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name (defaults to the file stem)
    #[serde(default)]
    pub name: Option<String>,

    /// Events that start the workflow
    #[serde(rename = "on")]
    pub on: TriggerConfig,

    /// Environment shared by every job
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Jobs by id
    pub jobs: BTreeMap<String, JobConfig>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Runner label; recorded for display, jobs always run on the local host
    #[serde(default)]
    pub runs_on: Option<Value>,

    #[serde(default)]
    pub strategy: StrategyConfig,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Default timeout for every step of the job
    #[serde(default)]
    pub timeout_minutes: Option<u64>,

    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub id: Option<String>,

    /// Action reference, e.g. `actions/checkout@v2`
    #[serde(default)]
    pub uses: Option<String>,

    /// Action inputs
    #[serde(default)]
    pub with: BTreeMap<String, Value>,

    /// Shell script
    #[serde(default)]
    pub run: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Relative to the job workspace
    #[serde(default)]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub timeout_minutes: Option<u64>,
}

/// Render a YAML scalar the way workflow expressions see it
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Convert an `env:` / `with:` mapping to strings, rejecting nested values
pub(crate) fn string_map(map: &BTreeMap<String, Value>, what: &str) -> Result<BTreeMap<String, String>> {
    map.iter()
        .map(|(key, value)| {
            let value = scalar_to_string(value)
                .with_context(|| format!("{} '{}' must be a scalar value", what, key))?;
            Ok((key.clone(), value))
        })
        .collect()
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
        let mut config = Self::from_yaml(&content)?;

        if config.name.is_none() {
            config.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }

        Ok(config)
    }

    /// Parse workflow configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml).context("Invalid workflow YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        TriggerFilter::from_config(&self.on)?;
        string_map(&self.env, "Workflow env")?;

        if self.jobs.is_empty() {
            anyhow::bail!("Workflow defines no jobs");
        }

        for (job_id, job) in &self.jobs {
            self.validate_job(job_id, job)
                .with_context(|| format!("Invalid job '{}'", job_id))?;
        }

        Ok(())
    }

    fn validate_job(&self, job_id: &str, job: &JobConfig) -> Result<()> {
        if job.steps.is_empty() {
            anyhow::bail!("Job '{}' has no steps", job_id);
        }

        if job.timeout_minutes == Some(0) {
            anyhow::bail!("timeout-minutes must be positive");
        }

        if job.strategy.max_parallel == Some(0) {
            anyhow::bail!("strategy.max-parallel must be positive");
        }

        if let Some(matrix) = &job.strategy.matrix {
            if matrix.expand()?.is_empty() {
                anyhow::bail!("Matrix produces no entries");
            }
        }

        string_map(&job.env, "Job env")?;

        for (index, step) in job.steps.iter().enumerate() {
            let label = step
                .name
                .clone()
                .or_else(|| step.id.clone())
                .unwrap_or_else(|| format!("#{}", index + 1));

            match (&step.uses, &step.run) {
                (Some(_), Some(_)) => {
                    anyhow::bail!("Step '{}' has both 'uses' and 'run'", label)
                }
                (None, None) => anyhow::bail!("Step '{}' needs either 'uses' or 'run'", label),
                (None, Some(script)) if script.trim().is_empty() => {
                    anyhow::bail!("Step '{}' has an empty 'run' script", label)
                }
                (Some(uses), None) if uses.trim().is_empty() => {
                    anyhow::bail!("Step '{}' has an empty 'uses' reference", label)
                }
                _ => {}
            }

            if step.timeout_minutes == Some(0) {
                anyhow::bail!("Step '{}' timeout-minutes must be positive", label);
            }

            string_map(&step.env, "Step env")
                .and_then(|_| string_map(&step.with, "Step input"))
                .with_context(|| format!("Step '{}'", label))?;
        }

        Ok(())
    }

    /// Display name of the workflow
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }

    /// Convert config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}
