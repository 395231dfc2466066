//! matrix-ci - run matrix CI workflows locally
//!
//! A workflow is filtered by its trigger, fanned out over its build
//! matrix, and every resulting job run executes its steps in order,
//! halting at the first failure.

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use core::{
    EventKind, ExecutionStatus, JobRun, MatrixEntry, PipelineRun, StepResult, StepState,
    TriggerEvent, Workflow,
};
pub use core::config::WorkflowConfig;
pub use execution::{
    CommandOutput, CommandRunner, CommandSpec, ExecutionEngine, ExecutionEvent, ProcessRunner,
    RunnerError, SchedulingStrategy,
};
