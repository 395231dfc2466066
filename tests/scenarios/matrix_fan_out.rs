//! Test: trigger filtering and matrix expansion

use crate::helpers::*;
use matrix_ci::{ExecutionStatus, SchedulingStrategy, TriggerEvent};
use std::sync::Arc;

/// One job run per Python version for a push to master
#[tokio::test]
async fn test_push_to_master_runs_every_version() {
    let workflow = media_converter_workflow();
    let runner = Arc::new(ScriptedRunner::new());

    let run = run_scripted(
        &workflow,
        TriggerEvent::push("master"),
        runner.clone(),
        SchedulingStrategy::Parallel,
    )
    .await;

    assert_eq!(run.status, ExecutionStatus::Succeeded);
    let keys: Vec<&str> = run.jobs.iter().map(|j| j.key.as_str()).collect();
    assert_eq!(keys, vec!["build (3.10)", "build (3.11)"]);

    for version in ["3.10", "3.11"] {
        let key = format!("build ({})", version);
        assert_job_succeeded(&run, &key);
        let names: Vec<String> = job(&run, &key).steps.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, step_names(version));
        // the version reaches setup-python as an interpreter name
        assert!(runner
            .invocations_in(version)
            .iter()
            .any(|c| c.contains(&format!("python{}", version))));
    }
}

/// Pull requests against master fan out the same way
#[tokio::test]
async fn test_pull_request_to_master_runs_every_version() {
    let workflow = media_converter_workflow();
    let run = run_scripted(
        &workflow,
        TriggerEvent::pull_request("master").with_revision("abc123"),
        Arc::new(ScriptedRunner::new()),
        SchedulingStrategy::Sequential,
    )
    .await;

    assert_eq!(run.jobs.len(), 2);
    assert!(run.is_success());
}

/// Other branches produce no job runs at all
#[tokio::test]
async fn test_other_branches_produce_nothing() {
    let workflow = media_converter_workflow();

    for trigger in [
        TriggerEvent::push("develop"),
        TriggerEvent::pull_request("feature/x"),
        TriggerEvent::push("master-old"),
    ] {
        let runner = Arc::new(ScriptedRunner::new());
        let run = run_scripted(&workflow, trigger, runner.clone(), SchedulingStrategy::Parallel).await;

        assert!(run.jobs.is_empty());
        assert_eq!(run.status, ExecutionStatus::Skipped);
        assert!(runner.invocations().is_empty());
    }
}

/// Checkout targets the triggering revision
#[tokio::test]
async fn test_checkout_uses_trigger_revision() {
    let workflow = media_converter_workflow();
    let runner = Arc::new(ScriptedRunner::new());

    run_scripted(
        &workflow,
        TriggerEvent::push("master").with_revision("deadbeef"),
        runner.clone(),
        SchedulingStrategy::Sequential,
    )
    .await;

    let checkouts: Vec<String> = runner
        .invocations()
        .into_iter()
        .map(|i| i.command)
        .filter(|c| c.contains("checkout --quiet --detach"))
        .collect();
    assert_eq!(checkouts.len(), 2);
    assert!(checkouts.iter().all(|c| c.ends_with("deadbeef")));
}

/// include/exclude reshape the matrix, and jobs without one run once
#[tokio::test]
async fn test_include_exclude_and_plain_jobs() {
    let workflow = workflow_from_yaml(
        r#"
name: Matrix
on:
  push:
    branches: [ "release/**" ]
jobs:
  lint:
    steps:
      - run: flake8 .
  test:
    strategy:
      matrix:
        os: [linux, macos]
        python: ["3.10", "3.11"]
        exclude:
          - os: macos
            python: "3.10"
        include:
          - os: linux
            python: "3.12"
    steps:
      - run: pytest
"#,
    );

    let run = run_scripted(
        &workflow,
        TriggerEvent::push("release/1.0"),
        Arc::new(ScriptedRunner::new()),
        SchedulingStrategy::Parallel,
    )
    .await;

    let keys: Vec<&str> = run.jobs.iter().map(|j| j.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "lint",
            "test (linux, 3.10)",
            "test (linux, 3.11)",
            "test (macos, 3.11)",
            "test (linux, 3.12)",
        ]
    );
    assert!(run.is_success());
}

/// branches-ignore excludes matching branches from an otherwise open event
#[tokio::test]
async fn test_branches_ignore() {
    let workflow = workflow_from_yaml(
        r#"
on:
  push:
    branches-ignore: [ "wip/*" ]
jobs:
  build:
    steps:
      - run: make
"#,
    );

    assert_eq!(workflow.evaluate(&TriggerEvent::push("main")).len(), 1);
    assert!(workflow.evaluate(&TriggerEvent::push("wip/idea")).is_empty());
    // pull_request is not listed
    assert!(workflow.evaluate(&TriggerEvent::pull_request("main")).is_empty());
}
