//! Job context - values visible to `${{ }}` expressions

use crate::core::{matrix::MatrixEntry, trigger::TriggerEvent};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

fn expression_regex() -> &'static Regex {
    static EXPRESSION: OnceLock<Regex> = OnceLock::new();
    EXPRESSION.get_or_init(|| {
        Regex::new(r"\$\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("expression regex is valid")
    })
}

/// Values available while a job run executes
///
/// Expressions look like `${{ matrix.python-version }}`. The supported roots are
/// `matrix`, `github`, `env` and `runner`.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    /// The job run's matrix entry
    pub matrix: MatrixEntry,

    /// `github.*` values: ref, sha, event_name, workspace, job
    pub github: BTreeMap<String, String>,

    /// Merged environment (workflow, job, then step)
    pub env: BTreeMap<String, String>,

    /// `runner.*` values: os, temp
    pub runner: BTreeMap<String, String>,
}

impl JobContext {
    /// Create a context for one matrix entry of a triggered job
    pub fn new(trigger: &TriggerEvent, matrix: MatrixEntry) -> Self {
        let mut github = BTreeMap::new();
        github.insert("ref".to_string(), trigger.git_ref());
        github.insert(
            "sha".to_string(),
            trigger.revision.clone().unwrap_or_else(|| "HEAD".to_string()),
        );
        github.insert("event_name".to_string(), trigger.kind.as_str().to_string());
        github.insert("ref_name".to_string(), trigger.branch.clone());

        let mut runner = BTreeMap::new();
        runner.insert("os".to_string(), std::env::consts::OS.to_string());

        Self {
            matrix,
            github,
            env: BTreeMap::new(),
            runner,
        }
    }

    pub fn with_job(mut self, job_id: &str) -> Self {
        self.github.insert("job".to_string(), job_id.to_string());
        self
    }

    pub fn with_workspace(mut self, workspace: &Path) -> Self {
        self.github
            .insert("workspace".to_string(), workspace.display().to_string());
        self
    }

    pub fn with_temp_dir(mut self, temp: &Path) -> Self {
        self.runner.insert("temp".to_string(), temp.display().to_string());
        self
    }

    /// Render and merge an `env:` block on top of the current environment
    pub fn merge_env(&mut self, env: &BTreeMap<String, String>) {
        for (key, value) in env {
            let rendered = self.render(value);
            self.env.insert(key.clone(), rendered);
        }
    }

    /// A copy of this context with a step's `env:` merged in
    pub fn scoped(&self, env: &BTreeMap<String, String>) -> Self {
        let mut scoped = self.clone();
        scoped.merge_env(env);
        scoped
    }

    /// Resolve a dotted expression such as `matrix.python-version`
    pub fn lookup(&self, expression: &str) -> Option<String> {
        let (root, key) = expression.split_once('.')?;
        match root {
            "matrix" => self.matrix.get(key).map(str::to_string),
            "github" => self.github.get(key).cloned(),
            "env" => self.env.get(key).cloned(),
            "runner" => self.runner.get(key).cloned(),
            _ => None,
        }
    }

    /// Substitute every `${{ }}` expression. Unknown expressions become empty.
    pub fn render(&self, template: &str) -> String {
        expression_regex()
            .replace_all(template, |caps: &Captures| {
                let expression = &caps[1];
                self.lookup(expression).unwrap_or_else(|| {
                    warn!("Unknown expression '{}' rendered as empty", expression);
                    String::new()
                })
            })
            .into_owned()
    }

    /// Render each value of a map
    pub fn render_map(&self, map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.render(v)))
            .collect()
    }

    /// Flattened view of every value, for display
    pub fn get_rendering_variables(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        for (k, v) in self.matrix.values() {
            vars.insert(format!("matrix.{}", k), v.clone());
        }
        for (k, v) in &self.github {
            vars.insert(format!("github.{}", k), v.clone());
        }
        for (k, v) in &self.env {
            vars.insert(format!("env.{}", k), v.clone());
        }
        for (k, v) in &self.runner {
            vars.insert(format!("runner.{}", k), v.clone());
        }
        vars
    }
}
