//! Workflow domain model

use crate::core::{
    config::{string_map, WorkflowConfig},
    job::{Job, JobPlan},
    matrix::MatrixEntry,
    trigger::{TriggerEvent, TriggerFilter},
};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A validated workflow definition
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,

    /// Which events start a run
    pub trigger: TriggerFilter,

    /// Environment shared by every job
    pub env: BTreeMap<String, String>,

    /// Jobs in job-id order
    pub jobs: Vec<Arc<Job>>,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let jobs = config
            .jobs
            .iter()
            .map(|(id, job)| Job::from_config(id, job).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(Workflow {
            name: config.display_name().to_string(),
            trigger: TriggerFilter::from_config(&config.on)?,
            env: string_map(&config.env, "Workflow env")?,
            jobs,
        })
    }

    /// Get a job by id
    pub fn job(&self, id: &str) -> Option<&Arc<Job>> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// Matrix entries a trigger would run; empty when the trigger does not match
    pub fn matrix_entries(&self, trigger: &TriggerEvent) -> Vec<MatrixEntry> {
        self.evaluate(trigger)
            .into_iter()
            .map(|plan| plan.entry)
            .collect()
    }

    /// One plan per job and matrix entry when the trigger matches, nothing otherwise
    pub fn evaluate(&self, trigger: &TriggerEvent) -> Vec<JobPlan> {
        if !self.trigger.matches(trigger) {
            debug!(
                "Trigger {} on '{}' does not match workflow '{}'",
                trigger.kind, trigger.branch, self.name
            );
            return Vec::new();
        }

        self.jobs
            .iter()
            .flat_map(|job| job.entries.iter().map(move |entry| (job, entry)))
            .enumerate()
            .map(|(index, (job, entry))| JobPlan::new(job.clone(), entry.clone(), index))
            .collect()
    }

    /// Total number of job runs a matching trigger produces
    pub fn job_run_count(&self) -> usize {
        self.jobs.iter().map(|job| job.entries.len()).sum()
    }
}
