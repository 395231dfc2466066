//! Scenario-based tests for matrix-ci
//!
//! Workflows run end to end through the engine with a scripted command
//! runner standing in for real processes.

#[path = "../helpers.rs"]
mod helpers;

mod expressions;
mod fail_fast;
mod history;
mod matrix_fan_out;
mod scheduling;
mod single_job_run;
mod timeouts;
