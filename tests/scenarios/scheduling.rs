//! Test: scheduling strategies bound how many job runs overlap

use crate::helpers::*;
use matrix_ci::{SchedulingStrategy, TriggerEvent};
use std::sync::Arc;
use std::time::Duration;

const FOUR_ENTRIES: &str = r#"
on: push
jobs:
  build:
    strategy:
      matrix:
        python-version: ["3.9", "3.10", "3.11", "3.12"]
    steps:
      - run: pytest
"#;

async fn peak_for(yaml: &str, strategy: SchedulingStrategy) -> usize {
    let workflow = workflow_from_yaml(yaml);
    let runner = Arc::new(ScriptedRunner::new().with_delay(Duration::from_millis(100)));
    let run = run_scripted(&workflow, TriggerEvent::push("main"), runner.clone(), strategy).await;
    assert!(run.is_success());
    assert_eq!(run.jobs.len(), 4);
    runner.peak_concurrency()
}

#[tokio::test]
async fn test_sequential_runs_one_at_a_time() {
    assert_eq!(peak_for(FOUR_ENTRIES, SchedulingStrategy::Sequential).await, 1);
}

#[tokio::test]
async fn test_limited_parallel_respects_bound() {
    let peak = peak_for(FOUR_ENTRIES, SchedulingStrategy::LimitedParallel(2)).await;
    assert!(peak <= 2, "peak was {}", peak);
    assert!(peak >= 1);
}

#[tokio::test]
async fn test_parallel_overlaps_entries() {
    let peak = peak_for(FOUR_ENTRIES, SchedulingStrategy::Parallel).await;
    assert!(peak > 1, "peak was {}", peak);
}

/// `strategy.max-parallel` caps one job even under an unbounded strategy
#[tokio::test]
async fn test_job_max_parallel() {
    let yaml = FOUR_ENTRIES.replace("    strategy:\n", "    strategy:\n      max-parallel: 1\n");
    assert_eq!(peak_for(&yaml, SchedulingStrategy::Parallel).await, 1);
}

/// Job runs are reported in plan order whatever order they finish in
#[tokio::test]
async fn test_results_keep_plan_order() {
    let workflow = workflow_from_yaml(FOUR_ENTRIES);
    let runner = Arc::new(
        ScriptedRunner::new()
            .sleep_in("pytest", "3.9", Duration::from_millis(300))
            .sleep_in("pytest", "3.10", Duration::from_millis(200)),
    );
    let run = run_scripted(
        &workflow,
        TriggerEvent::push("main"),
        runner,
        SchedulingStrategy::Parallel,
    )
    .await;

    let keys: Vec<&str> = run.jobs.iter().map(|j| j.key.as_str()).collect();
    assert_eq!(
        keys,
        vec!["build (3.9)", "build (3.10)", "build (3.11)", "build (3.12)"]
    );
}
