//! Job executor - runs one job run's steps in order

use crate::{
    core::{
        FailureKind, JobContext, JobPlan, JobRun, RunnerSettings, Step, StepAction, StepResult,
        StepState, TriggerEvent,
    },
    execution::{
        actions::{self, ActionTarget},
        cancel::CancelSignal,
        engine::{EventBus, ExecutionEvent},
        runner::{CommandRunner, CommandSpec, OutputBuffer},
        workspace::JobWorkspace,
    },
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

const SKIP_AFTER_FAILURE: &str = "an earlier step failed";
const SKIP_AFTER_CANCEL: &str = "job run was cancelled";

/// Inputs shared by every job run of one pipeline run
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub trigger: TriggerEvent,
    /// Workflow-level `env:`
    pub workflow_env: BTreeMap<String, String>,
    /// `<work-root>/<run-id>`
    pub run_dir: std::path::PathBuf,
}

type StepFailure = (FailureKind, String);

/// Executes the steps of a single job run
pub struct JobExecutor<R> {
    runner: Arc<R>,
    settings: Arc<RunnerSettings>,
}

impl<R> Clone for JobExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<R: CommandRunner> JobExecutor<R> {
    pub fn new(runner: Arc<R>, settings: Arc<RunnerSettings>) -> Self {
        Self { runner, settings }
    }

    /// Run every step in order, stopping at the first failure
    pub async fn execute(
        &self,
        plan: &JobPlan,
        request: &JobRequest,
        cancel: &CancelSignal,
        events: &EventBus,
    ) -> JobRun {
        let workspace = JobWorkspace::new(&request.run_dir, &plan.slug());
        let mut ctx = plan
            .context(&request.trigger)
            .with_workspace(&workspace.workspace)
            .with_temp_dir(&workspace.temp);
        ctx.merge_env(&request.workflow_env);
        ctx.merge_env(&plan.job.env);
        debug!("{} expression context: {:?}", plan.key, ctx.get_rendering_variables());

        let names = plan
            .job
            .steps
            .iter()
            .map(|step| step.display_name(&ctx))
            .collect();
        let mut run = JobRun::new(plan, names);
        run.start();

        info!("Starting job run: {}", plan.key);
        events
            .emit(ExecutionEvent::JobStarted {
                job_key: plan.key.clone(),
                job_name: plan.name.clone(),
            })
            .await;

        if let Err(e) = workspace.create().await {
            error!("Failed to create workspace for {}: {}", plan.key, e);
            let now = Utc::now();
            run.steps[0].state = StepState::Failed {
                failure: FailureKind::Provisioning {
                    message: format!("cannot create {}: {}", workspace.root.display(), e),
                },
                output: String::new(),
                started_at: now,
                failed_at: now,
            };
            self.halt(&mut run, SKIP_AFTER_FAILURE, events).await;
            return self.finish(run, events).await;
        }

        let base_env = workspace.base_env(&ctx);

        for step in &plan.job.steps {
            if cancel.is_cancelled() {
                info!("Job run {} cancelled before step {}", plan.key, step.index + 1);
                self.halt(&mut run, SKIP_AFTER_CANCEL, events).await;
                break;
            }

            let step_ctx = ctx.scoped(&step.env);
            let step_name = run.steps[step.index].name.clone();
            let started_at = Utc::now();
            run.steps[step.index].state = StepState::Running { started_at };

            debug!("{}: step {} '{}'", plan.key, step.index + 1, step_name);
            events
                .emit(ExecutionEvent::StepStarted {
                    job_key: plan.key.clone(),
                    step_index: step.index,
                    step_name: step_name.clone(),
                })
                .await;

            let step_timeout = plan
                .job
                .step_timeout(step)
                .or(self.settings.step_timeout_secs);
            let outcome = self
                .execute_step(step, step_timeout, &step_ctx, &base_env, &workspace, request, cancel)
                .await;

            let finished_at = Utc::now();
            let state = match outcome {
                Ok(output) => StepState::Succeeded {
                    exit_code: 0,
                    output,
                    started_at,
                    finished_at,
                },
                Err((failure, output)) => {
                    warn!("{}: step '{}' {}", plan.key, step_name, failure);
                    StepState::Failed {
                        failure,
                        output,
                        started_at,
                        failed_at: finished_at,
                    }
                }
            };
            let failed = state.is_failed();
            run.steps[step.index].state = state;

            if let Some(result) = StepResult::from_state(&step_name, &run.steps[step.index].state) {
                events
                    .emit(ExecutionEvent::StepFinished {
                        job_key: plan.key.clone(),
                        step_index: step.index,
                        result,
                    })
                    .await;
            }

            if failed {
                self.halt(&mut run, SKIP_AFTER_FAILURE, events).await;
                break;
            }
        }

        self.finish(run, events).await
    }

    /// Skip every pending step and report it
    async fn halt(&self, run: &mut JobRun, reason: &str, events: &EventBus) {
        run.skip_remaining(reason);
        for step in run.steps.iter().filter(|s| matches!(s.state, StepState::Skipped { .. })) {
            events
                .emit(ExecutionEvent::StepSkipped {
                    job_key: run.key.clone(),
                    step_index: step.index,
                    step_name: step.name.clone(),
                    reason: reason.to_string(),
                })
                .await;
        }
    }

    async fn finish(&self, mut run: JobRun, events: &EventBus) -> JobRun {
        run.finish();
        info!("Job run {} finished: {}", run.key, run.status);
        events
            .emit(ExecutionEvent::JobFinished {
                job_key: run.key.clone(),
                status: run.status,
                failed_step: run.failed_step().map(|s| s.name.clone()),
            })
            .await;
        run
    }

    /// Run one step under its timeout, racing the cancel signal
    #[allow(clippy::too_many_arguments)]
    async fn execute_step(
        &self,
        step: &Step,
        timeout_secs: Option<u64>,
        ctx: &JobContext,
        base_env: &BTreeMap<String, String>,
        workspace: &JobWorkspace,
        request: &JobRequest,
        cancel: &CancelSignal,
    ) -> Result<String, StepFailure> {
        let mut env = base_env.clone();
        env.extend(ctx.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let commands = self.commands_for(step, ctx, &env, workspace, request)?;
        let is_action = step.is_action();
        let output = OutputBuffer::new();
        let work = self.run_commands(&commands, is_action, &output);

        match timeout_secs {
            Some(secs) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err((FailureKind::Cancelled, output.snapshot())),
                    result = timeout(Duration::from_secs(secs), work) => {
                        result.unwrap_or_else(|_| {
                            Err((FailureKind::TimedOut { after_secs: secs }, output.snapshot()))
                        })
                    }
                }
            }
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => Err((FailureKind::Cancelled, output.snapshot())),
                    result = work => result,
                }
            }
        }
    }

    fn commands_for(
        &self,
        step: &Step,
        ctx: &JobContext,
        env: &BTreeMap<String, String>,
        workspace: &JobWorkspace,
        request: &JobRequest,
    ) -> Result<Vec<CommandSpec>, StepFailure> {
        match &step.action {
            StepAction::Run {
                script,
                working_directory,
            } => {
                let (program, leading) = self
                    .settings
                    .shell
                    .split_first()
                    .ok_or_else(|| provisioning("no shell configured"))?;
                let cwd = match working_directory {
                    Some(dir) => workspace.workspace.join(ctx.render(dir)),
                    None => workspace.workspace.clone(),
                };

                Ok(vec![CommandSpec::new(program.clone())
                    .args(leading.iter().cloned())
                    .arg(ctx.render(script))
                    .current_dir(cwd)
                    .envs(env)])
            }
            StepAction::Uses { action, with } => {
                let target = ActionTarget {
                    source_dir: self.settings.source_dir.as_path(),
                    workspace,
                    revision: request.trigger.revision.as_deref(),
                };
                let commands = actions::resolve(action, &ctx.render_map(with), target)
                    .map_err(|e| provisioning(&e.to_string()))?;
                Ok(commands.into_iter().map(|cmd| cmd.envs(env)).collect())
            }
        }
    }

    async fn run_commands(
        &self,
        commands: &[CommandSpec],
        is_action: bool,
        output: &OutputBuffer,
    ) -> Result<String, StepFailure> {
        for command in commands {
            let result = self.runner.run_captured(command, output).await.map_err(|e| {
                (
                    FailureKind::Provisioning { message: e.to_string() },
                    output.snapshot(),
                )
            })?;

            if !result.success() {
                let failure = if is_action {
                    FailureKind::Provisioning {
                        message: format!(
                            "'{}' exited with code {}",
                            command_name(command),
                            result.exit_code
                        ),
                    }
                } else {
                    FailureKind::ExitCode {
                        code: result.exit_code,
                    }
                };
                return Err((failure, output.snapshot()));
            }
        }

        Ok(output.snapshot())
    }
}

fn provisioning(message: &str) -> StepFailure {
    (
        FailureKind::Provisioning {
            message: message.to_string(),
        },
        String::new(),
    )
}

fn command_name(command: &CommandSpec) -> String {
    Path::new(&command.program)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| command.program.clone())
}
