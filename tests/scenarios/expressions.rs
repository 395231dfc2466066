//! Test: `${{ }}` expressions and env layering reach the commands

use crate::helpers::*;
use matrix_ci::{SchedulingStrategy, TriggerEvent};
use std::sync::Arc;

const YAML: &str = r#"
name: Expressions
on:
  pull_request:
    branches: [ main ]
env:
  STAGE: workflow
  TARGET: ${{ github.ref_name }}
jobs:
  build:
    name: Build on ${{ matrix.python-version }}
    env:
      STAGE: job
    strategy:
      matrix:
        python-version: ["3.10", "3.11"]
    steps:
      - name: Report ${{ matrix.python-version }}
        run: echo ${{ matrix.python-version }} ${{ github.event_name }} ${{ env.STAGE }} ${{ env.TARGET }}
      - run: echo ${{ env.STAGE }}
        env:
          STAGE: step
      - run: echo [${{ matrix.missing }}]
"#;

#[tokio::test]
async fn test_expressions_render_per_entry() {
    let workflow = workflow_from_yaml(YAML);
    let runner = Arc::new(ScriptedRunner::new());

    let run = run_scripted(
        &workflow,
        TriggerEvent::pull_request("main"),
        runner.clone(),
        SchedulingStrategy::Sequential,
    )
    .await;
    assert!(run.is_success());

    let job = job(&run, "build (3.11)");
    assert_eq!(job.name, "Build on 3.11");
    assert_eq!(job.steps[0].name, "Report 3.11");

    let commands = runner.invocations_in("3.11");
    assert_eq!(
        commands,
        vec![
            "sh -e -c echo 3.11 pull_request job main",
            "sh -e -c echo step",
            "sh -e -c echo []",
        ]
    );
}

#[test]
fn test_plan_renders_names_without_running() {
    let workflow = workflow_from_yaml(YAML);
    let plans = workflow.evaluate(&TriggerEvent::pull_request("main"));
    assert_eq!(plans.len(), 2);

    let ctx = plans[0].context(&TriggerEvent::pull_request("main"));
    assert_eq!(plans[0].name, "Build on 3.10");
    assert_eq!(plans[0].job.steps[0].display_name(&ctx), "Report 3.10");
    assert_eq!(plans[0].slug(), "00-build_3.10");

    assert!(workflow.evaluate(&TriggerEvent::push("main")).is_empty());
}
