//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a pipeline run or a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Not started
    Pending,
    /// Currently running
    Running,
    /// Every step succeeded
    Succeeded,
    /// A step failed
    Failed,
    /// Stopped because a sibling failed with fail-fast enabled
    Cancelled,
    /// Trigger matched no job
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ExecutionStatus::Pending),
            "running" => Some(ExecutionStatus::Running),
            "succeeded" => Some(ExecutionStatus::Succeeded),
            "failed" => Some(ExecutionStatus::Failed),
            "cancelled" => Some(ExecutionStatus::Cancelled),
            "skipped" => Some(ExecutionStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionStatus::Failed | ExecutionStatus::Cancelled)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The environment could not be prepared (unsupported action, missing runtime, spawn error)
    Provisioning { message: String },
    /// The command exited non-zero
    ExitCode { code: i32 },
    /// The step exceeded its timeout
    TimedOut { after_secs: u64 },
    /// A sibling job failed with fail-fast enabled
    Cancelled,
}

impl FailureKind {
    /// Exit code, when the step ran to completion
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            FailureKind::ExitCode { code } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Provisioning { message } => write!(f, "provisioning failed: {}", message),
            FailureKind::ExitCode { code } => write!(f, "exited with code {}", code),
            FailureKind::TimedOut { after_secs } => write!(f, "timed out after {}s", after_secs),
            FailureKind::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// State of a single step within a job run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Not reached yet
    Pending,
    /// Currently running
    Running { started_at: DateTime<Utc> },
    /// Exited with status 0
    Succeeded {
        exit_code: i32,
        output: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Halted the job run
    Failed {
        failure: FailureKind,
        output: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Not attempted because an earlier step failed
    Skipped { reason: String },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Succeeded { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }

    /// Whether the step was actually executed
    pub fn was_reached(&self) -> bool {
        matches!(self, StepState::Succeeded { .. } | StepState::Failed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepState::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Running { .. } => "running",
            StepState::Succeeded { .. } => "succeeded",
            StepState::Failed { .. } => "failed",
            StepState::Skipped { .. } => "skipped",
        }
    }
}

/// Outcome of a step that was reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    /// `None` when the command never produced an exit status
    pub exit_code: Option<i32>,
    pub success: bool,
    pub failure: Option<FailureKind>,
    /// Captured stdout and stderr
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    /// Build a result from a terminal, reached state
    pub fn from_state(name: &str, state: &StepState) -> Option<Self> {
        match state {
            StepState::Succeeded {
                exit_code,
                output,
                started_at,
                finished_at,
            } => Some(Self {
                name: name.to_string(),
                exit_code: Some(*exit_code),
                success: true,
                failure: None,
                output: output.clone(),
                started_at: *started_at,
                finished_at: *finished_at,
            }),
            StepState::Failed {
                failure,
                output,
                started_at,
                failed_at,
            } => Some(Self {
                name: name.to_string(),
                exit_code: failure.exit_code(),
                success: false,
                failure: Some(failure.clone()),
                output: output.clone(),
                started_at: *started_at,
                finished_at: *failed_at,
            }),
            _ => None,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
