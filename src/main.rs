mod cli;
mod core;
mod execution;
mod persistence;

use anyhow::{Context, Result};
use cli::commands::{HistoryCommand, ListCommand, PlanCommand, RunCommand, ValidateCommand};
use cli::output::*;
use cli::{Cli, Command};
use crate::core::config::WorkflowConfig;
use crate::core::{ExecutionStatus, RunnerSettings};
use execution::{ExecutionEngine, ExecutionEvent, ProcessRunner};
use persistence::{create_summary, InMemoryPersistence, PersistenceBackend, RunSummary};
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Lines of a failed step's output shown in the final report
const REPORT_OUTPUT_LINES: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    let settings = RunnerSettings::load(cli.config.as_deref())
        .context("Failed to load runner settings")?;

    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, &cli, settings).await?,
        Command::Plan(cmd) => plan_workflow(cmd)?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::List(cmd) => list_workflows(cmd, &settings).await?,
        Command::History(cmd) => show_history(cmd, &settings).await?,
    }

    Ok(())
}

fn load_workflow(path: &std::path::Path) -> Result<(WorkflowConfig, crate::core::Workflow)> {
    let config = WorkflowConfig::from_file(path).context("Failed to load workflow")?;
    let workflow = config.to_workflow()?;
    Ok((config, workflow))
}

#[cfg(feature = "sqlite")]
async fn open_store(settings: &RunnerSettings) -> Result<Arc<dyn PersistenceBackend>> {
    let store = persistence::SqliteRunStore::open(settings.history_db.as_deref()).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(_settings: &RunnerSettings) -> Result<Arc<dyn PersistenceBackend>> {
    warn!("Built without sqlite; history is not kept between invocations");
    Ok(Arc::new(InMemoryPersistence::new()))
}

async fn run_workflow(cmd: &RunCommand, cli: &Cli, mut settings: RunnerSettings) -> Result<()> {
    let (_, workflow) = load_workflow(&cmd.trigger.file)?;
    let trigger = cmd.trigger.to_event();
    let report = ReportStream::for_json(cmd.json);

    report.line(format!(
        "{}Loaded workflow: {} ({} job run(s) per matching trigger)",
        INFO,
        style(&workflow.name).bold(),
        workflow.job_run_count()
    ));

    // CLI overrides
    if let Some(source) = &cmd.source {
        settings.source_dir = source.clone();
    }
    if let Some(max_parallel) = cmd.max_parallel {
        settings.max_parallel = max_parallel.max(1);
    }
    if cmd.keep_workspaces {
        settings.keep_workspaces = true;
    }

    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_store(&settings).await?
    };

    let strategy = match cmd.strategy {
        Some(arg) => arg.to_strategy(settings.max_parallel),
        None => settings.scheduling_strategy()?,
    };
    let engine = ExecutionEngine::new(ProcessRunner, settings).with_strategy(strategy);

    let total = engine.evaluate(&workflow, &trigger).len();
    let progress = create_progress_bar(total);
    let bar = progress.clone();
    let stream = cli.stream;

    engine
        .add_event_handler(move |event| {
            bar.println(format_execution_event(&event));

            match &event {
                ExecutionEvent::StepFinished { result, .. } if stream => {
                    if !result.output.trim().is_empty() {
                        bar.println(format_output(&result.output, usize::MAX));
                    }
                }
                ExecutionEvent::JobFinished { job_key, .. } => {
                    bar.inc(1);
                    bar.set_message(job_key.clone());
                }
                _ => {}
            }
        })
        .await;

    let run = engine.execute(&workflow, trigger).await;
    progress.finish_and_clear();
    let run = run?;

    if !run.jobs.is_empty() {
        report.line(format!("\n{}", separator()));
        for job in &run.jobs {
            report.line(format_job_report(job, REPORT_OUTPUT_LINES).trim_end());
        }
        report.line(separator());
    }

    if !cmd.no_history {
        let summary = create_summary(&run);
        match store.save_run(&summary).await {
            Ok(()) => report.line(format!(
                "{}Run saved to history (ID: {})",
                INFO,
                style(&summary.run_id.to_string()[..8]).dim()
            )),
            Err(e) => warn!("Failed to save run to history: {:#}", e),
        }
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    }

    match run.status {
        ExecutionStatus::Succeeded => {
            report.line(format!(
                "\n{}{} completed {}",
                CHECK,
                style(&workflow.name).bold(),
                style("successfully").green()
            ));
        }
        ExecutionStatus::Skipped => {
            report.line(format!(
                "\n{}{} not triggered by {}",
                SKIP,
                style(&workflow.name).bold(),
                format_trigger(&run.trigger)
            ));
        }
        _ => {
            let failed: Vec<&str> = run.failed_jobs().map(|j| j.key.as_str()).collect();
            report.line(format!(
                "\n{}{} {} ({})",
                CROSS,
                style(&workflow.name).bold(),
                style("failed").red(),
                failed.join(", ")
            ));
            error!("{} job run(s) failed", failed.len());
            std::process::exit(1);
        }
    }

    Ok(())
}

fn plan_workflow(cmd: &PlanCommand) -> Result<()> {
    let (_, workflow) = load_workflow(&cmd.trigger.file)?;
    let trigger = cmd.trigger.to_event();
    let plans = workflow.evaluate(&trigger);

    if cmd.json {
        let runs: Vec<_> = plans
            .iter()
            .map(|plan| {
                let ctx = plan.context(&trigger);
                serde_json::json!({
                    "key": plan.key,
                    "job": plan.job.id,
                    "name": plan.name,
                    "matrix": plan.entry,
                    "runs_on": plan.job.runs_on,
                    "steps": plan
                        .job
                        .steps
                        .iter()
                        .map(|step| serde_json::json!({
                            "id": step.id,
                            "name": step.display_name(&ctx),
                            "command": step.describe(&ctx),
                        }))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        let data = serde_json::json!({
            "workflow": workflow.name,
            "event": trigger.kind,
            "branch": trigger.branch,
            "job_runs": runs,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if plans.is_empty() {
        println!(
            "{}{} is not triggered by {}",
            INFO,
            style(&workflow.name).bold(),
            format_trigger(&trigger)
        );
        return Ok(());
    }

    println!(
        "{}{} on {}: {} job run(s)",
        INFO,
        style(&workflow.name).bold(),
        format_trigger(&trigger),
        style(plans.len()).cyan()
    );
    print!("{}", format_plan(&plans, &trigger));

    Ok(())
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<()> {
    println!("{}Validating workflow...", INFO);

    match load_workflow(&cmd.file) {
        Ok((config, workflow)) => {
            println!("{}Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&workflow.name).bold());
            for (kind, filter) in workflow.trigger.events() {
                if filter.patterns().is_empty() {
                    println!("  Trigger: {} (any branch)", style(kind).cyan());
                } else {
                    println!(
                        "  Trigger: {} on {}",
                        style(kind).cyan(),
                        filter.patterns().join(", ")
                    );
                }
            }
            println!("  Jobs: {}", style(workflow.jobs.len()).cyan());
            println!("  Job runs: {}", style(workflow.job_run_count()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn list_workflows(cmd: &ListCommand, settings: &RunnerSettings) -> Result<()> {
    let store = open_store(settings).await?;
    let workflows = store.list_workflows().await?;

    if workflows.is_empty() {
        println!("{}No workflows found in history", INFO);
        return Ok(());
    }

    if cmd.json {
        let mut json_data = Vec::new();
        for workflow in &workflows {
            let runs = store.list_runs(workflow).await?;
            json_data.push(serde_json::json!({
                "name": workflow,
                "run_count": runs.len(),
            }));
        }
        let data = serde_json::json!({ "workflows": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{}Workflows in history:", INFO);

    for workflow in &workflows {
        if cmd.with_counts {
            let runs = store.list_runs(workflow).await?;
            let succeeded = runs
                .iter()
                .filter(|r| r.status == ExecutionStatus::Succeeded)
                .count();
            let failed = runs.iter().filter(|r| r.status.is_failure()).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(workflow).bold(),
                style(runs.len()).cyan(),
                style(succeeded).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(workflow).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand, settings: &RunnerSettings) -> Result<()> {
    let store = open_store(settings).await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.details)?,
            None => println!("{}Run not found", WARN),
        }
        return Ok(());
    }

    let runs = match &cmd.workflow {
        Some(workflow) => {
            let mut runs = store.list_runs(workflow).await?;
            runs.truncate(cmd.limit);
            runs
        }
        None => store.recent_runs(cmd.limit).await?,
    };

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("{}No runs found", INFO);
        return Ok(());
    }

    println!("{}Run history (showing latest {}):", INFO, cmd.limit);
    for summary in &runs {
        println!("  {}", format_run_summary(summary));
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, details: bool) -> Result<()> {
    println!("{}Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Event: {} to {}", summary.event, style(&summary.branch).cyan());
    if let Some(revision) = &summary.revision {
        println!("  Revision: {}", style(revision).dim());
    }
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }

    println!("  Job runs:");
    for job in &summary.jobs {
        let progress = format!("{}/{} steps", job.steps_run, job.total_steps);
        match (&job.failed_step, &job.failure) {
            (Some(step), Some(failure)) => println!(
                "    {} {} ({}) at {}: {}",
                style(&job.key).bold(),
                format_status(job.status),
                progress,
                style(step).red(),
                failure
            ),
            _ => println!(
                "    {} {} ({})",
                style(&job.key).bold(),
                format_status(job.status),
                progress
            ),
        }
    }

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
