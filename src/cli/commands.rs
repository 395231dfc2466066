//! CLI command definitions

use crate::core::{EventKind, TriggerEvent};
use crate::execution::SchedulingStrategy;
use clap::Args;
use std::path::PathBuf;

/// Run a workflow for a trigger event
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub trigger: TriggerArgs,

    /// Source tree to check out (overrides settings)
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Scheduling strategy (overrides settings)
    #[arg(long, value_enum)]
    pub strategy: Option<SchedulingStrategyArg>,

    /// Bound for `parallel-limited`
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Keep job workspaces after the run
    #[arg(long)]
    pub keep_workspaces: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Print the pipeline run as JSON when done
    #[arg(long)]
    pub json: bool,
}

/// Show the job runs a trigger would produce
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    #[command(flatten)]
    pub trigger: TriggerArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Workflow file and trigger event
#[derive(Debug, Args, Clone)]
pub struct TriggerArgs {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Event kind
    #[arg(short, long, value_enum, default_value_t = EventArg::Push)]
    pub event: EventArg,

    /// Target branch of the event
    #[arg(short, long, default_value = "master")]
    pub branch: String,

    /// Revision to check out (defaults to the source's HEAD)
    #[arg(short, long)]
    pub revision: Option<String>,
}

impl TriggerArgs {
    pub fn to_event(&self) -> TriggerEvent {
        let event = TriggerEvent::new(self.event.into(), self.branch.clone());
        match &self.revision {
            Some(revision) => event.with_revision(revision.clone()),
            None => event,
        }
    }
}

/// Validate a workflow file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List workflows with recorded runs
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Event kind argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventArg {
    Push,
    PullRequest,
}

impl From<EventArg> for EventKind {
    fn from(arg: EventArg) -> Self {
        match arg {
            EventArg::Push => EventKind::Push,
            EventArg::PullRequest => EventKind::PullRequest,
        }
    }
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl SchedulingStrategyArg {
    pub fn to_strategy(self, max_parallel: usize) -> SchedulingStrategy {
        match self {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(max_parallel),
        }
    }
}
