//! Job domain model and its matrix fan-out

use crate::core::{
    config::{string_map, JobConfig},
    context::JobContext,
    matrix::MatrixEntry,
    step::Step,
    trigger::TriggerEvent,
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A job: an ordered step list run once per matrix entry
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,

    /// Name template; may reference `matrix.*`
    pub name: Option<String>,

    /// Runner label from `runs-on`, informational
    pub runs_on: Option<String>,

    /// Expanded matrix; a single empty entry when the job has no matrix
    pub entries: Vec<MatrixEntry>,

    /// Cancel sibling entries when one fails
    pub fail_fast: bool,

    /// Cap on concurrently running entries
    pub max_parallel: Option<usize>,

    pub env: BTreeMap<String, String>,

    /// Default step timeout
    pub timeout_secs: Option<u64>,

    pub steps: Vec<Step>,
}

impl Job {
    /// Create a job from its configuration
    pub fn from_config(id: &str, config: &JobConfig) -> Result<Self> {
        let entries = match &config.strategy.matrix {
            Some(matrix) => matrix
                .expand()
                .with_context(|| format!("Invalid matrix for job '{}'", id))?,
            None => vec![MatrixEntry::default()],
        };

        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| Step::from_config(step, index))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Invalid step in job '{}'", id))?;

        let runs_on = config.runs_on.as_ref().map(|value| match value {
            serde_yaml::Value::Sequence(labels) => labels
                .iter()
                .filter_map(crate::core::config::scalar_to_string)
                .collect::<Vec<_>>()
                .join(", "),
            other => crate::core::config::scalar_to_string(other).unwrap_or_default(),
        });

        Ok(Job {
            id: id.to_string(),
            name: config.name.clone(),
            runs_on,
            entries,
            fail_fast: config.strategy.fail_fast.unwrap_or(false),
            max_parallel: config.strategy.max_parallel,
            env: string_map(&config.env, "Job env")?,
            timeout_secs: config.timeout_minutes.map(|m| m * 60),
            steps,
        })
    }

    /// Unique key of one entry's job run: `build (3.10)`, or just the id
    pub fn key(&self, entry: &MatrixEntry) -> String {
        if entry.is_empty() {
            self.id.clone()
        } else {
            format!("{} ({})", self.id, entry.label())
        }
    }

    /// Display name of one entry's job run
    pub fn display_name(&self, entry: &MatrixEntry) -> String {
        match &self.name {
            Some(name) if name.contains("${{") => {
                let ctx = JobContext {
                    matrix: entry.clone(),
                    ..JobContext::default()
                };
                ctx.render(name)
            }
            Some(name) if !entry.is_empty() => format!("{} ({})", name, entry.label()),
            Some(name) => name.clone(),
            None => self.key(entry),
        }
    }

    /// Effective timeout of a step
    pub fn step_timeout(&self, step: &Step) -> Option<u64> {
        step.timeout_secs.or(self.timeout_secs)
    }
}

/// One matrix entry of a job, scheduled to run
#[derive(Debug, Clone)]
pub struct JobPlan {
    pub job: Arc<Job>,
    pub entry: MatrixEntry,
    /// Position of the job run in the pipeline plan
    pub index: usize,
    pub key: String,
    pub name: String,
}

impl JobPlan {
    pub fn new(job: Arc<Job>, entry: MatrixEntry, index: usize) -> Self {
        let key = job.key(&entry);
        let name = job.display_name(&entry);
        Self {
            job,
            entry,
            index,
            key,
            name,
        }
    }

    /// Directory-safe form of the key
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.key.len());
        for c in self.key.chars() {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                slug.push(c);
            } else if !slug.ends_with('_') {
                slug.push('_');
            }
        }
        let slug = slug.trim_matches('_').to_string();
        format!("{:02}-{}", self.index, slug)
    }

    /// Context for expressions, before the workspace exists
    pub fn context(&self, trigger: &TriggerEvent) -> JobContext {
        JobContext::new(trigger, self.entry.clone()).with_job(&self.job.id)
    }
}
