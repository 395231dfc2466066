//! Pipeline execution engine

pub mod actions;
pub mod cancel;
pub mod engine;
pub mod executor;
pub mod runner;
pub mod scheduler;
pub mod workspace;

pub use engine::{EventBus, EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{JobExecutor, JobRequest};
pub use runner::{
    CommandOutput, CommandRunner, CommandSpec, OutputBuffer, ProcessRunner, RunnerError,
};
pub use scheduler::SchedulingStrategy;
