//! Runtime records: pipeline runs and their job runs

use crate::core::{
    job::JobPlan,
    matrix::MatrixEntry,
    state::{ExecutionStatus, FailureKind, StepResult, StepState},
    trigger::TriggerEvent,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A step of a job run with its current state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStep {
    pub index: usize,
    pub name: String,
    pub state: StepState,
}

/// One matrix entry's execution of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: Uuid,
    pub job_id: String,
    pub key: String,
    pub name: String,
    pub entry: MatrixEntry,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<JobStep>,
}

impl JobRun {
    /// Create a pending job run with the given step names
    pub fn new(plan: &JobPlan, step_names: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: plan.job.id.clone(),
            key: plan.key.clone(),
            name: plan.name.clone(),
            entry: plan.entry.clone(),
            status: ExecutionStatus::Pending,
            started_at: None,
            finished_at: None,
            steps: step_names
                .into_iter()
                .enumerate()
                .map(|(index, name)| JobStep {
                    index,
                    name,
                    state: StepState::Pending,
                })
                .collect(),
        }
    }

    /// A job run that could not run at all, e.g. its task panicked
    pub fn aborted(plan: &JobPlan, message: impl Into<String>) -> Self {
        let mut run = Self::new(plan, vec!["Set up job".to_string()]);
        let now = Utc::now();
        run.started_at = Some(now);
        run.steps[0].state = StepState::Failed {
            failure: FailureKind::Provisioning {
                message: message.into(),
            },
            output: String::new(),
            started_at: now,
            failed_at: now,
        };
        run.finish();
        run
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark every step not yet reached as skipped
    pub fn skip_remaining(&mut self, reason: &str) {
        for step in &mut self.steps {
            if matches!(step.state, StepState::Pending) {
                step.state = StepState::Skipped {
                    reason: reason.to_string(),
                };
            }
        }
    }

    /// Derive the final status from the step states
    pub fn finish(&mut self) {
        self.status = match self.failed_step().map(|s| &s.state) {
            Some(StepState::Failed {
                failure: FailureKind::Cancelled,
                ..
            }) => ExecutionStatus::Cancelled,
            Some(_) => ExecutionStatus::Failed,
            None if self.steps.iter().all(|s| matches!(s.state, StepState::Succeeded { .. })) => {
                ExecutionStatus::Succeeded
            }
            None if self
                .steps
                .iter()
                .any(|s| matches!(s.state, StepState::Skipped { .. })) =>
            {
                ExecutionStatus::Cancelled
            }
            None => ExecutionStatus::Failed,
        };
        self.finished_at = Some(Utc::now());
    }

    /// The step that halted the run, if any
    pub fn failed_step(&self) -> Option<&JobStep> {
        self.steps.iter().find(|s| s.state.is_failed())
    }

    /// Results of the steps that were reached, in order
    pub fn step_results(&self) -> Vec<StepResult> {
        self.steps
            .iter()
            .filter_map(|s| StepResult::from_state(&s.name, &s.state))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    pub fn steps_run(&self) -> usize {
        self.steps.iter().filter(|s| s.state.was_reached()).count()
    }
}

/// A single evaluation of a trigger against a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub workflow_name: String,
    pub trigger: TriggerEvent,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub jobs: Vec<JobRun>,
}

impl PipelineRun {
    pub fn new(workflow_name: impl Into<String>, trigger: TriggerEvent) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            trigger,
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            jobs: Vec::new(),
        }
    }

    /// Record the job runs and derive the overall status
    pub fn complete(&mut self, jobs: Vec<JobRun>) {
        self.status = if jobs.is_empty() {
            ExecutionStatus::Skipped
        } else if jobs.iter().any(|job| job.status.is_failure()) {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        };
        self.jobs = jobs;
        self.completed_at = Some(Utc::now());
    }

    /// Exit-status view: only a failed run is a failure
    pub fn is_success(&self) -> bool {
        !self.status.is_failure()
    }

    pub fn job(&self, key: &str) -> Option<&JobRun> {
        self.jobs.iter().find(|job| job.key == key)
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobRun> {
        self.jobs.iter().filter(|job| job.status.is_failure())
    }
}
