//! Test: one matrix entry run on its own through `run_job`

use crate::helpers::*;
use matrix_ci::core::{FailureKind, RunnerSettings};
use matrix_ci::{ExecutionEngine, ExecutionStatus, TriggerEvent};
use std::path::Path;
use std::sync::Arc;

fn engine(work_root: &Path, runner: Arc<ScriptedRunner>) -> ExecutionEngine<Arc<ScriptedRunner>> {
    let settings = RunnerSettings {
        work_root: work_root.to_path_buf(),
        ..RunnerSettings::default()
    };
    ExecutionEngine::new(runner, settings)
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn test_run_job_records_all_seven_steps_in_order() {
    let workflow = media_converter_workflow();
    let trigger = TriggerEvent::push("master").with_revision("abc123");
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    let engine = engine(dir.path(), runner.clone());

    let plans = engine.evaluate(&workflow, &trigger);
    assert_eq!(plans.len(), 2);
    let plan = &plans[1];
    assert_eq!(plan.key, "build (3.11)");

    let run = engine.run_job(&workflow, plan, &trigger).await.unwrap();

    assert_eq!(run.status, ExecutionStatus::Succeeded);
    let results = run.step_results();
    let names: Vec<String> = results.iter().map(|r| r.name.clone()).collect();
    assert_eq!(names, step_names("3.11"));
    assert!(results.iter().all(|r| r.success));

    // only this entry ran
    assert!(runner.invocations_in("3.10").is_empty());
    assert!(runner.ran("setup.py test"));
    assert!(is_empty_dir(dir.path()));
}

#[tokio::test]
async fn test_run_job_halts_at_lint() {
    let workflow = media_converter_workflow();
    let trigger = TriggerEvent::pull_request("master");
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new().fail("flake8 .", 1));
    let engine = engine(dir.path(), runner.clone());

    let plan = engine.evaluate(&workflow, &trigger).remove(0);
    let run = engine.run_job(&workflow, &plan, &trigger).await.unwrap();

    assert_eq!(run.status, ExecutionStatus::Failed);
    assert_eq!(run.failed_step().map(|s| s.name.as_str()), Some(LINT));
    let results = run.step_results();
    assert_eq!(results.len(), 5);
    assert!(results[..4].iter().all(|r| r.success));
    assert_eq!(results[4].failure, Some(FailureKind::ExitCode { code: 1 }));
    assert!(!runner.ran("vulture ."));
    assert!(!runner.ran("setup.py test"));
    assert!(is_empty_dir(dir.path()));
}
