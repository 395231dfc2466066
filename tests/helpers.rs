//! Test utilities for matrix-ci
#![allow(dead_code)]

use async_trait::async_trait;
use matrix_ci::core::config::WorkflowConfig;
use matrix_ci::core::{JobRun, RunnerSettings, StepState};
use matrix_ci::{
    CommandOutput, CommandRunner, CommandSpec, ExecutionEngine, ExecutionStatus, PipelineRun,
    RunnerError, SchedulingStrategy, TriggerEvent, Workflow,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const LINT: &str = "Lint with flake8";
pub const DEAD_CODE: &str = "Find dead code with vulture";
pub const TESTS: &str = "Test with pytest";

/// Step names of the shipped workflow for one Python version, in order
pub fn step_names(version: &str) -> Vec<String> {
    vec![
        "Run actions/checkout@v2".to_string(),
        format!("Set up Python {}", version),
        "Install ffmpeg".to_string(),
        "Install dependencies".to_string(),
        LINT.to_string(),
        DEAD_CODE.to_string(),
        TESTS.to_string(),
    ]
}

/// Load the shipped media-converter workflow
pub fn media_converter_workflow() -> Workflow {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/media-converter-ci.yml");
    WorkflowConfig::from_file(path)
        .and_then(|config| config.to_workflow())
        .unwrap_or_else(|e| panic!("Failed to load {}: {:#}", path, e))
}

/// Parse a workflow from YAML string
pub fn workflow_from_yaml(yaml: &str) -> Workflow {
    WorkflowConfig::from_yaml(yaml)
        .and_then(|config| config.to_workflow())
        .unwrap_or_else(|e| panic!("Failed to parse workflow YAML: {:#}", e))
}

/// One command the runner was asked to execute
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: String,
    /// `GITHUB_WORKSPACE` of the job run that issued it
    pub workspace: String,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    entry: Option<String>,
    exit_code: i32,
    delay: Option<Duration>,
    refuse: bool,
}

impl Rule {
    fn matches(&self, command: &str, workspace: &str) -> bool {
        command.contains(&self.pattern)
            && self
                .entry
                .as_ref()
                .map_or(true, |entry| workspace.contains(entry.as_str()))
    }
}

/// Command runner that answers from a script instead of spawning processes
///
/// Every command succeeds unless a rule matches its command line (and,
/// optionally, the job run's workspace path, which carries the matrix value).
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    default_delay: Option<Duration>,
    log: Mutex<Vec<Invocation>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` exit with `code`
    pub fn fail(self, pattern: &str, code: i32) -> Self {
        self.rule(pattern, None, code, None)
    }

    /// Like `fail`, but only in job runs whose workspace mentions `entry`
    pub fn fail_in(self, pattern: &str, entry: &str, code: i32) -> Self {
        self.rule(pattern, Some(entry), code, None)
    }

    /// Commands containing `pattern` take `delay` and then succeed
    pub fn sleep(self, pattern: &str, delay: Duration) -> Self {
        self.rule(pattern, None, 0, Some(delay))
    }

    /// Like `sleep`, only in job runs whose workspace mentions `entry`
    pub fn sleep_in(self, pattern: &str, entry: &str, delay: Duration) -> Self {
        self.rule(pattern, Some(entry), 0, Some(delay))
    }

    /// Commands containing `pattern` cannot be started at all
    pub fn refuse(mut self, pattern: &str) -> Self {
        self = self.rule(pattern, None, 0, None);
        if let Some(rule) = self.rules.last_mut() {
            rule.refuse = true;
        }
        self
    }

    /// Delay for commands no rule matches
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    fn rule(mut self, pattern: &str, entry: Option<&str>, exit_code: i32, delay: Option<Duration>) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            entry: entry.map(str::to_string),
            exit_code,
            delay,
            refuse: false,
        });
        self
    }

    /// Every command issued so far
    pub fn invocations(&self) -> Vec<Invocation> {
        self.log.lock().unwrap().clone()
    }

    /// Commands issued by the job run whose workspace mentions `entry`
    pub fn invocations_in(&self, entry: &str) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|i| i.workspace.contains(entry))
            .map(|i| i.command)
            .collect()
    }

    /// Whether any command containing `pattern` was issued
    pub fn ran(&self, pattern: &str) -> bool {
        self.invocations().iter().any(|i| i.command.contains(pattern))
    }

    /// Highest number of commands running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        let line = command.display();
        let workspace = command.env.get("GITHUB_WORKSPACE").cloned().unwrap_or_default();
        self.log.lock().unwrap().push(Invocation {
            command: line.clone(),
            workspace: workspace.clone(),
        });

        let rule = self.rules.iter().find(|r| r.matches(&line, &workspace));
        let delay = rule.and_then(|r| r.delay).or(self.default_delay);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match rule {
            Some(rule) if rule.refuse => Err(RunnerError::Internal(format!(
                "refused to start '{}'",
                rule.pattern
            ))),
            Some(rule) if rule.exit_code != 0 => Ok(CommandOutput::new(
                rule.exit_code,
                "",
                format!("{}: exit {}\n", rule.pattern, rule.exit_code),
            )),
            _ => Ok(CommandOutput::new(0, "ok\n", "")),
        }
    }
}

/// Run a workflow for a trigger against a scripted runner
pub async fn run_scripted(
    workflow: &Workflow,
    trigger: TriggerEvent,
    runner: Arc<ScriptedRunner>,
    strategy: SchedulingStrategy,
) -> PipelineRun {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = RunnerSettings {
        work_root: dir.path().to_path_buf(),
        ..RunnerSettings::default()
    };
    let engine = ExecutionEngine::new(runner, settings).with_strategy(strategy);
    engine
        .execute(workflow, trigger)
        .await
        .unwrap_or_else(|e| panic!("Pipeline run errored: {:#}", e))
}

/// Get a job run by key, or panic
pub fn job<'a>(run: &'a PipelineRun, key: &str) -> &'a JobRun {
    run.job(key).unwrap_or_else(|| {
        let keys: Vec<&str> = run.jobs.iter().map(|j| j.key.as_str()).collect();
        panic!("Job run '{}' not found; have {:?}", key, keys)
    })
}

/// Step state labels of a job run, in order
pub fn step_labels(run: &PipelineRun, key: &str) -> Vec<&'static str> {
    job(run, key).steps.iter().map(|s| s.state.label()).collect()
}

/// Assert a job run succeeded with every step
pub fn assert_job_succeeded(run: &PipelineRun, key: &str) {
    let job = job(run, key);
    assert_eq!(
        job.status,
        ExecutionStatus::Succeeded,
        "Job run '{}' should have succeeded, steps: {:?}",
        key,
        step_labels(run, key)
    );
    assert!(job.steps.iter().all(|s| matches!(s.state, StepState::Succeeded { .. })));
}

/// Assert a job run failed at `step_name` and nothing after it ran
pub fn assert_job_failed_at(run: &PipelineRun, key: &str, step_name: &str) {
    let job = job(run, key);
    assert_eq!(
        job.status,
        ExecutionStatus::Failed,
        "Job run '{}' should have failed, steps: {:?}",
        key,
        step_labels(run, key)
    );

    let failed = job
        .failed_step()
        .unwrap_or_else(|| panic!("Job run '{}' has no failed step", key));
    assert_eq!(failed.name, step_name);

    for step in &job.steps {
        let expected = match step.index.cmp(&failed.index) {
            std::cmp::Ordering::Less => "succeeded",
            std::cmp::Ordering::Equal => "failed",
            std::cmp::Ordering::Greater => "skipped",
        };
        assert_eq!(
            step.state.label(),
            expected,
            "Step '{}' of '{}'",
            step.name,
            key
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_scripted_runner_rules() {
        let runner = ScriptedRunner::new()
            .fail("flake8 .", 1)
            .fail_in("pytest", "3.11", 2);

        let spec = |line: &str, ws: &str| {
            let env = BTreeMap::from([("GITHUB_WORKSPACE".to_string(), ws.to_string())]);
            CommandSpec::new("sh").args(["-e", "-c", line]).envs(&env)
        };

        assert_eq!(runner.run(&spec("flake8 .", "/w/00-build_3.10")).await.unwrap().exit_code, 1);
        assert_eq!(runner.run(&spec("pytest", "/w/00-build_3.10")).await.unwrap().exit_code, 0);
        assert_eq!(runner.run(&spec("pytest", "/w/01-build_3.11")).await.unwrap().exit_code, 2);
        assert_eq!(runner.invocations_in("3.11"), vec!["sh -e -c pytest"]);
        assert!(runner.ran("flake8"));
    }

    #[test]
    fn test_media_converter_workflow_loads() {
        let workflow = media_converter_workflow();
        assert_eq!(workflow.name, "Tests");
        assert_eq!(workflow.job_run_count(), 2);
    }
}
