//! CLI output formatting

use crate::{
    core::{ExecutionStatus, JobPlan, JobRun, StepState, TriggerEvent},
    execution::ExecutionEvent,
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

const DEFAULT_WIDTH: usize = 80;

/// Where the human-readable run report is written
///
/// With `--json` stdout carries only the JSON document, so the report moves to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStream {
    Stdout,
    Stderr,
}

impl ReportStream {
    pub fn for_json(json: bool) -> Self {
        if json {
            ReportStream::Stderr
        } else {
            ReportStream::Stdout
        }
    }

    pub fn line(&self, text: impl std::fmt::Display) {
        match self {
            ReportStream::Stdout => println!("{}", text),
            ReportStream::Stderr => eprintln!("{}", text),
        }
    }
}

/// Create a progress bar counting finished job runs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} job runs {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule as wide as the terminal
pub fn separator() -> String {
    let width = term_size::dimensions()
        .map(|(w, _)| w)
        .unwrap_or(DEFAULT_WIDTH)
        .min(120);
    style("─".repeat(width)).dim().to_string()
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        StepState::Failed { failure, .. } => {
            style(format!("FAILED ({})", failure)).red().to_string()
        }
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
        ExecutionStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

fn status_icon(status: ExecutionStatus) -> Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Cancelled => WARN,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Skipped => SKIP,
        ExecutionStatus::Pending => INFO,
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format a trigger event for display
pub fn format_trigger(trigger: &TriggerEvent) -> String {
    match &trigger.revision {
        Some(revision) => format!("{} to {} @ {}", trigger.kind, trigger.branch, revision),
        None => format!("{} to {}", trigger.kind, trigger.branch),
    }
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    format!(
        "{}{} - {} - {} {} - {} ({}/{} job runs failed)",
        status_icon(summary.status),
        style(short_id(&summary.run_id)).dim(),
        style(&summary.workflow_name).bold(),
        summary.event,
        style(&summary.branch).cyan(),
        format_status(summary.status),
        summary.failed_jobs(),
        summary.total_jobs()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            workflow_name,
            trigger,
            job_runs,
        } => format!(
            "{}Running {} for {} ({}) - {} job run(s)",
            ROCKET,
            style(workflow_name).bold(),
            format_trigger(trigger),
            style(short_id(run_id)).dim(),
            job_runs
        ),
        ExecutionEvent::JobStarted { job_key, job_name } => {
            if job_key == job_name {
                format!("{}{}", SPINNER, style(job_key).cyan())
            } else {
                format!("{}{} ({})", SPINNER, style(job_key).cyan(), job_name)
            }
        }
        ExecutionEvent::StepStarted {
            job_key,
            step_index,
            step_name,
        } => format!(
            "  {} [{}] {}",
            style(job_key).dim(),
            step_index + 1,
            step_name
        ),
        ExecutionEvent::StepFinished {
            job_key,
            result,
            ..
        } => {
            let elapsed = result.duration().to_std().unwrap_or_default();
            if result.success {
                format!(
                    "  {} {}{} {}",
                    style(job_key).dim(),
                    CHECK,
                    style(&result.name).green(),
                    style(format_duration(elapsed)).dim()
                )
            } else {
                let reason = result
                    .failure
                    .as_ref()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "failed".to_string());
                format!(
                    "  {} {}{}: {}",
                    style(job_key).dim(),
                    CROSS,
                    style(&result.name).red(),
                    style(reason).dim()
                )
            }
        }
        ExecutionEvent::StepSkipped {
            job_key,
            step_name,
            ..
        } => format!(
            "  {} {}{}",
            style(job_key).dim(),
            SKIP,
            style(step_name).dim()
        ),
        ExecutionEvent::JobFinished {
            job_key,
            status,
            failed_step,
        } => match failed_step {
            Some(step) => format!(
                "{}{} {} at {}",
                status_icon(*status),
                style(job_key).bold(),
                format_status(*status),
                style(step).red()
            ),
            None => format!(
                "{}{} {}",
                status_icon(*status),
                style(job_key).bold(),
                format_status(*status)
            ),
        },
        ExecutionEvent::PipelineCompleted { run_id, status } => format!(
            "{}Pipeline run ({}) {}",
            INFO,
            style(short_id(run_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Format step output with truncation, keeping the last lines
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.trim_end().to_string()
    } else {
        let kept = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            kept
        )
    }
}

/// Per-job report: every step, and the failed step's output
pub fn format_job_report(job: &JobRun, max_output_lines: usize) -> String {
    let mut report = format!(
        "{}{} {}\n",
        status_icon(job.status),
        style(&job.key).bold(),
        format_status(job.status)
    );

    for step in &job.steps {
        report.push_str(&format!(
            "    {:>2}. {} {}\n",
            step.index + 1,
            step.name,
            format_step_state(&step.state)
        ));
    }

    if let Some(StepState::Failed { output, .. }) = job.failed_step().map(|s| &s.state) {
        if !output.trim().is_empty() {
            for line in format_output(output, max_output_lines).lines() {
                report.push_str(&format!("      {}\n", style(line).dim()));
            }
        }
    }

    report
}

/// Plan of a trigger: one block per job run with its resolved steps
pub fn format_plan(plans: &[JobPlan], trigger: &TriggerEvent) -> String {
    let mut out = String::new();
    for plan in plans {
        let ctx = plan.context(trigger);
        match &plan.job.runs_on {
            Some(runs_on) => out.push_str(&format!(
                "{}{} {}\n",
                INFO,
                style(&plan.key).bold(),
                style(format!("(runs-on: {})", runs_on)).dim()
            )),
            None => out.push_str(&format!("{}{}\n", INFO, style(&plan.key).bold())),
        }
        for step in &plan.job.steps {
            out.push_str(&format!(
                "    {:>2}. {}\n        {}\n",
                step.index + 1,
                step.display_name(&ctx),
                style(step.describe(&ctx)).dim()
            ));
        }
    }
    out
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}.{}s", secs, duration.subsec_millis() / 100)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
