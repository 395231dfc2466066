//! Core domain models
//!
//! Workflow definitions (triggers, matrix, jobs, steps), the expression
//! context, and the records produced while a pipeline runs.

pub mod config;
pub mod context;
pub mod job;
pub mod matrix;
pub mod run;
pub mod settings;
pub mod state;
pub mod step;
pub mod trigger;
pub mod workflow;

pub use context::*;
pub use job::*;
pub use matrix::MatrixEntry;
pub use run::*;
pub use settings::RunnerSettings;
pub use state::*;
pub use step::*;
pub use trigger::{EventKind, TriggerEvent, TriggerFilter};
pub use workflow::*;
