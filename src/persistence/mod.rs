//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::{EventKind, JobRun, PipelineRun};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of one job run, as kept in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub key: String,
    pub status: ExecutionStatus,
    /// Name of the step that halted the run
    pub failed_step: Option<String>,
    /// Why that step failed
    pub failure: Option<String>,
    pub steps_run: usize,
    pub total_steps: usize,
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub workflow_name: String,
    pub event: EventKind,
    pub branch: String,
    pub revision: Option<String>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub jobs: Vec<JobSummary>,
}

impl RunSummary {
    pub fn total_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn failed_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| j.status.is_failure()).count()
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a pipeline run
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List runs of a workflow, newest first
    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>>;

    /// List all workflow names
    async fn list_workflows(&self) -> Result<Vec<String>>;

    /// Latest runs across all workflows, newest first
    async fn recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let mut runs = Vec::new();
        for workflow in self.list_workflows().await? {
            runs.extend(self.list_runs(&workflow).await?);
        }
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }
}

/// In-memory persistence (for testing or `--no-history`)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| r.workflow_name == workflow_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.workflow_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

fn summarize_job(job: &JobRun) -> JobSummary {
    let failed = job.failed_step();
    JobSummary {
        key: job.key.clone(),
        status: job.status,
        failed_step: failed.map(|s| s.name.clone()),
        failure: failed.and_then(|s| match &s.state {
            crate::core::StepState::Failed { failure, .. } => Some(failure.to_string()),
            _ => None,
        }),
        steps_run: job.steps_run(),
        total_steps: job.steps.len(),
    }
}

/// Create a summary from a pipeline run
pub fn create_summary(run: &PipelineRun) -> RunSummary {
    RunSummary {
        run_id: run.run_id,
        workflow_name: run.workflow_name.clone(),
        event: run.trigger.kind,
        branch: run.trigger.branch.clone(),
        revision: run.trigger.revision.clone(),
        status: run.status,
        started_at: run.started_at,
        completed_at: run.completed_at,
        jobs: run.jobs.iter().map(summarize_job).collect(),
    }
}
