//! Test: sibling job runs with fail-fast off and on

use crate::helpers::*;
use matrix_ci::core::{FailureKind, StepState};
use matrix_ci::{ExecutionStatus, SchedulingStrategy, TriggerEvent};
use std::sync::Arc;
use std::time::Duration;

/// One entry failing at lint does not touch the other, under any strategy
#[tokio::test]
async fn test_fail_fast_disabled_isolates_entries() {
    let workflow = media_converter_workflow();

    for strategy in [
        SchedulingStrategy::Sequential,
        SchedulingStrategy::Parallel,
        SchedulingStrategy::LimitedParallel(1),
    ] {
        let runner = Arc::new(ScriptedRunner::new().fail_in("flake8 .", "3.10", 1));
        let run = run_scripted(&workflow, TriggerEvent::push("master"), runner.clone(), strategy).await;

        assert_eq!(run.status, ExecutionStatus::Failed, "{}", strategy);
        assert_job_failed_at(&run, "build (3.10)", LINT);
        assert_job_succeeded(&run, "build (3.11)");
        assert!(runner
            .invocations_in("3.11")
            .iter()
            .any(|c| c.contains("setup.py test")));
        assert_eq!(run.failed_jobs().count(), 1);
    }
}

/// The failing entry finishing first still leaves a slow sibling running
#[tokio::test]
async fn test_slow_sibling_completes_after_failure() {
    let workflow = media_converter_workflow();
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail_in("flake8 .", "3.10", 1)
            .sleep_in("setup.py test", "3.11", Duration::from_millis(200)),
    );

    let run = run_scripted(
        &workflow,
        TriggerEvent::push("master"),
        runner,
        SchedulingStrategy::Parallel,
    )
    .await;

    assert_job_failed_at(&run, "build (3.10)", LINT);
    assert_job_succeeded(&run, "build (3.11)");
}

const FAIL_FAST: &str = r#"
on: push
jobs:
  build:
    strategy:
      fail-fast: true
      matrix:
        python-version: ["3.10", "3.11"]
    steps:
      - run: prepare
      - run: flake8 .
      - run: pytest
"#;

/// With fail-fast on, a later sibling is cancelled before it starts
#[tokio::test]
async fn test_fail_fast_cancels_pending_sibling() {
    let workflow = workflow_from_yaml(FAIL_FAST);
    let runner = Arc::new(ScriptedRunner::new().fail_in("flake8 .", "3.10", 1));

    let run = run_scripted(
        &workflow,
        TriggerEvent::push("main"),
        runner.clone(),
        SchedulingStrategy::Sequential,
    )
    .await;

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_job_failed_at(&run, "build (3.10)", "Run flake8 .");

    let sibling = job(&run, "build (3.11)");
    assert_eq!(sibling.status, ExecutionStatus::Cancelled);
    assert_eq!(sibling.steps_run(), 0);
    assert!(runner.invocations_in("3.11").is_empty());
}

/// With fail-fast on, a running sibling's step is interrupted
#[tokio::test]
async fn test_fail_fast_interrupts_running_sibling() {
    let workflow = workflow_from_yaml(FAIL_FAST);
    let runner = Arc::new(
        ScriptedRunner::new()
            .sleep_in("prepare", "3.10", Duration::from_millis(300))
            .fail_in("flake8 .", "3.10", 1)
            .sleep_in("flake8 .", "3.11", Duration::from_secs(30)),
    );

    let started = std::time::Instant::now();
    let run = run_scripted(
        &workflow,
        TriggerEvent::push("main"),
        runner,
        SchedulingStrategy::Parallel,
    )
    .await;
    assert!(started.elapsed() < Duration::from_secs(10));

    let sibling = job(&run, "build (3.11)");
    assert_eq!(sibling.status, ExecutionStatus::Cancelled);
    assert_eq!(step_labels(&run, "build (3.11)"), vec!["succeeded", "failed", "skipped"]);
    assert!(matches!(
        sibling.steps[1].state,
        StepState::Failed {
            failure: FailureKind::Cancelled,
            ..
        }
    ));
}
