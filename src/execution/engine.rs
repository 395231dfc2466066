//! Main execution engine - fans a triggered workflow out into job runs

use crate::{
    core::{
        ExecutionStatus, JobPlan, JobRun, PipelineRun, RunnerSettings, StepResult, TriggerEvent,
        Workflow,
    },
    execution::{
        cancel::{cancel_pair, CancelHandle, CancelSignal},
        executor::{JobExecutor, JobRequest},
        runner::CommandRunner,
        SchedulingStrategy,
    },
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        workflow_name: String,
        trigger: TriggerEvent,
        job_runs: usize,
    },
    JobStarted {
        job_key: String,
        job_name: String,
    },
    StepStarted {
        job_key: String,
        step_index: usize,
        step_name: String,
    },
    StepFinished {
        job_key: String,
        step_index: usize,
        result: StepResult,
    },
    StepSkipped {
        job_key: String,
        step_index: usize,
        step_name: String,
        reason: String,
    },
    JobFinished {
        job_key: String,
        status: ExecutionStatus,
        failed_step: Option<String>,
    },
    PipelineCompleted {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl EventBus {
    pub async fn subscribe(&self, handler: EventHandler) {
        self.handlers.lock().await.push(handler);
    }

    /// Emit an event to all handlers
    pub async fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Main pipeline execution engine
pub struct ExecutionEngine<R> {
    executor: JobExecutor<R>,
    settings: Arc<RunnerSettings>,
    strategy: SchedulingStrategy,
    events: EventBus,
}

impl<R: CommandRunner + 'static> ExecutionEngine<R> {
    pub fn new(runner: R, settings: RunnerSettings) -> Self {
        let strategy = settings.scheduling_strategy().unwrap_or_default();
        let settings = Arc::new(settings);
        let executor = JobExecutor::new(Arc::new(runner), settings.clone());

        Self {
            executor,
            settings,
            strategy,
            events: EventBus::default(),
        }
    }

    /// Override the strategy named in the settings
    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(Arc::new(handler)).await;
    }

    /// Job runs a trigger would produce; no side effects
    pub fn evaluate(&self, workflow: &Workflow, trigger: &TriggerEvent) -> Vec<JobPlan> {
        workflow.evaluate(trigger)
    }

    /// Evaluate the trigger and execute every resulting job run
    pub async fn execute(&self, workflow: &Workflow, trigger: TriggerEvent) -> Result<PipelineRun> {
        let mut pipeline = PipelineRun::new(&workflow.name, trigger.clone());
        let plans = self.evaluate(workflow, &trigger);

        info!(
            "Starting pipeline run: {} ({}) with {} job run(s)",
            workflow.name,
            pipeline.run_id,
            plans.len()
        );
        self.events
            .emit(ExecutionEvent::PipelineStarted {
                run_id: pipeline.run_id,
                workflow_name: workflow.name.clone(),
                trigger: trigger.clone(),
                job_runs: plans.len(),
            })
            .await;

        if plans.is_empty() {
            info!(
                "{} on '{}' matches no trigger of '{}'",
                trigger.kind, trigger.branch, workflow.name
            );
            pipeline.complete(Vec::new());
            self.emit_completed(&pipeline).await;
            return Ok(pipeline);
        }

        let run_dir = self.settings.work_root.join(pipeline.run_id.to_string());
        tokio::fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

        let request = Arc::new(JobRequest {
            trigger,
            workflow_env: workflow.env.clone(),
            run_dir: run_dir.clone(),
        });

        let jobs = if self.strategy.is_sequential() {
            self.run_sequential(plans, &request).await
        } else {
            self.run_concurrent(plans, request).await
        };

        self.cleanup(&run_dir).await;

        pipeline.complete(jobs);
        info!(
            "Pipeline run finished: {} - {}",
            workflow.name, pipeline.status
        );
        self.emit_completed(&pipeline).await;

        Ok(pipeline)
    }

    /// Execute a single job run of the workflow
    pub async fn run_job(
        &self,
        workflow: &Workflow,
        plan: &JobPlan,
        trigger: &TriggerEvent,
    ) -> Result<JobRun> {
        let run_dir = self.settings.work_root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("Failed to create run directory {}", run_dir.display()))?;

        let request = JobRequest {
            trigger: trigger.clone(),
            workflow_env: workflow.env.clone(),
            run_dir: run_dir.clone(),
        };
        let run = self
            .executor
            .execute(plan, &request, &CancelSignal::never(), &self.events)
            .await;

        self.cleanup(&run_dir).await;
        Ok(run)
    }

    async fn run_sequential(&self, plans: Vec<JobPlan>, request: &JobRequest) -> Vec<JobRun> {
        let mut cancels = FailFast::default();
        let mut runs = Vec::with_capacity(plans.len());

        for plan in plans {
            let (signal, handle) = cancels.for_plan(&plan);
            let run = self
                .executor
                .execute(&plan, request, &signal, &self.events)
                .await;
            trip_on_failure(&run, handle.as_ref());
            runs.push(run);
        }

        runs
    }

    async fn run_concurrent(&self, plans: Vec<JobPlan>, request: Arc<JobRequest>) -> Vec<JobRun> {
        let global = Arc::new(Semaphore::new(self.strategy.concurrency(plans.len())));
        let mut per_job: BTreeMap<String, Arc<Semaphore>> = BTreeMap::new();
        let mut cancels = FailFast::default();
        let mut handles = Vec::with_capacity(plans.len());

        debug!(
            "Scheduling {} job run(s) with strategy {}",
            plans.len(),
            self.strategy
        );

        for plan in plans {
            let job_limit = plan.job.max_parallel.map(|max| {
                per_job
                    .entry(plan.job.id.clone())
                    .or_insert_with(|| Arc::new(Semaphore::new(max.max(1))))
                    .clone()
            });
            let (signal, cancel) = cancels.for_plan(&plan);
            let global = global.clone();
            let executor = self.executor.clone();
            let events = self.events.clone();
            let request = request.clone();
            let task_plan = plan.clone();

            let handle = tokio::spawn(async move {
                let _job_permit = match job_limit {
                    Some(limit) => limit.acquire_owned().await.ok(),
                    None => None,
                };
                let _permit = global.acquire_owned().await.ok();

                let run = executor
                    .execute(&task_plan, &request, &signal, &events)
                    .await;
                trip_on_failure(&run, cancel.as_ref());
                run
            });
            handles.push((plan, handle));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for (plan, handle) in handles {
            match handle.await {
                Ok(run) => runs.push(run),
                Err(e) => {
                    error!("Job run {} task failed: {}", plan.key, e);
                    runs.push(JobRun::aborted(&plan, format!("job task failed: {}", e)));
                }
            }
        }
        runs
    }

    async fn cleanup(&self, run_dir: &Path) {
        if self.settings.keep_workspaces {
            info!("Keeping workspaces in {}", run_dir.display());
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(run_dir).await {
            warn!("Failed to remove {}: {}", run_dir.display(), e);
        }
    }

    async fn emit_completed(&self, pipeline: &PipelineRun) {
        self.events
            .emit(ExecutionEvent::PipelineCompleted {
                run_id: pipeline.run_id,
                status: pipeline.status,
            })
            .await;
    }
}

/// One cancel handle per fail-fast job, shared by its matrix entries
#[derive(Default)]
struct FailFast {
    handles: BTreeMap<String, CancelHandle>,
}

impl FailFast {
    fn for_plan(&mut self, plan: &JobPlan) -> (CancelSignal, Option<CancelHandle>) {
        if !plan.job.fail_fast {
            return (CancelSignal::never(), None);
        }
        let handle = self
            .handles
            .entry(plan.job.id.clone())
            .or_insert_with(|| cancel_pair().0)
            .clone();
        (handle.signal(), Some(handle))
    }
}

fn trip_on_failure(run: &JobRun, handle: Option<&CancelHandle>) {
    if run.status == ExecutionStatus::Failed {
        if let Some(handle) = handle {
            info!("Fail-fast: cancelling remaining entries of job '{}'", run.job_id);
            handle.cancel();
        }
    }
}
