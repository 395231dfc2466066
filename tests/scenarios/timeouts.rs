//! Test: steps that exceed their timeout fail the job run

use crate::helpers::*;
use matrix_ci::core::{FailureKind, RunnerSettings, StepState};
use matrix_ci::{ExecutionEngine, ExecutionStatus, SchedulingStrategy, TriggerEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};

const YAML: &str = r#"
on: push
jobs:
  build:
    strategy:
      matrix:
        python-version: ["3.10", "3.11"]
    steps:
      - run: pip install -r requirements.txt
      - run: pytest
      - run: coverage report
"#;

#[tokio::test]
async fn test_step_timeout_halts_only_that_entry() {
    let dir = tempfile::tempdir().unwrap();
    let settings = RunnerSettings {
        work_root: dir.path().to_path_buf(),
        step_timeout_secs: Some(1),
        ..RunnerSettings::default()
    };
    let runner = Arc::new(ScriptedRunner::new().sleep_in("pytest", "3.11", Duration::from_secs(30)));
    let engine = ExecutionEngine::new(runner.clone(), settings).with_strategy(SchedulingStrategy::Parallel);

    let started = Instant::now();
    let run = engine
        .execute(&workflow_from_yaml(YAML), TriggerEvent::push("main"))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_job_succeeded(&run, "build (3.10)");
    assert_job_failed_at(&run, "build (3.11)", "Run pytest");

    let failed = job(&run, "build (3.11)").failed_step().unwrap();
    assert!(matches!(
        failed.state,
        StepState::Failed {
            failure: FailureKind::TimedOut { after_secs: 1 },
            ..
        }
    ));
    assert!(!runner
        .invocations_in("3.11")
        .iter()
        .any(|c| c.contains("coverage")));
}

#[test]
fn test_workflow_timeouts_override_runner_default() {
    let workflow = workflow_from_yaml(
        r#"
on: push
jobs:
  build:
    timeout-minutes: 30
    steps:
      - run: make
      - run: make test
        timeout-minutes: 5
"#,
    );
    let job = workflow.job("build").unwrap();
    assert_eq!(job.step_timeout(&job.steps[0]), Some(30 * 60));
    assert_eq!(job.step_timeout(&job.steps[1]), Some(5 * 60));
}
