//! Test: pipeline runs are summarized into history

use crate::helpers::*;
use matrix_ci::core::EventKind;
use matrix_ci::persistence::{create_summary, InMemoryPersistence, PersistenceBackend};
use matrix_ci::{ExecutionStatus, SchedulingStrategy, TriggerEvent};
use std::sync::Arc;

async fn failed_lint_run() -> matrix_ci::PipelineRun {
    let workflow = media_converter_workflow();
    let runner = Arc::new(ScriptedRunner::new().fail_in("flake8 .", "3.10", 1));
    run_scripted(
        &workflow,
        TriggerEvent::pull_request("master").with_revision("abc123"),
        runner,
        SchedulingStrategy::Parallel,
    )
    .await
}

async fn check_round_trip(store: &dyn PersistenceBackend) {
    let run = failed_lint_run().await;
    let summary = create_summary(&run);
    store.save_run(&summary).await.unwrap();

    let loaded = store.load_run(run.run_id).await.unwrap().unwrap();
    assert_eq!(loaded.workflow_name, "Tests");
    assert_eq!(loaded.event, EventKind::PullRequest);
    assert_eq!(loaded.branch, "master");
    assert_eq!(loaded.revision.as_deref(), Some("abc123"));
    assert_eq!(loaded.status, ExecutionStatus::Failed);
    assert_eq!(loaded.total_jobs(), 2);
    assert_eq!(loaded.failed_jobs(), 1);

    let failed = &loaded.jobs[0];
    assert_eq!(failed.key, "build (3.10)");
    assert_eq!(failed.failed_step.as_deref(), Some(LINT));
    assert_eq!(failed.failure.as_deref(), Some("exited with code 1"));
    assert_eq!(failed.steps_run, 5);
    assert_eq!(failed.total_steps, 7);

    let passed = &loaded.jobs[1];
    assert_eq!(passed.status, ExecutionStatus::Succeeded);
    assert_eq!(passed.failed_step, None);

    assert_eq!(store.list_workflows().await.unwrap(), vec!["Tests"]);
    assert_eq!(store.list_runs("Tests").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_in_memory_history() {
    check_round_trip(&InMemoryPersistence::new()).await;
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_history() {
    let store = matrix_ci::persistence::SqliteRunStore::in_memory().await.unwrap();
    check_round_trip(&store).await;
}
