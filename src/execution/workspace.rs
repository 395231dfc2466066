//! Per-job isolated directories

use crate::core::JobContext;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directories owned by one job run: `<run-dir>/<slug>/{workspace,tools,tmp}`
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    pub root: PathBuf,
    /// Checked-out source; steps run here
    pub workspace: PathBuf,
    /// Prepended to `PATH`; provisioned runtimes are linked here
    pub tools: PathBuf,
    pub temp: PathBuf,
}

impl JobWorkspace {
    pub fn new(run_dir: &Path, slug: &str) -> Self {
        let root = run_dir.join(slug);
        Self {
            workspace: root.join("workspace"),
            tools: root.join("tools"),
            temp: root.join("tmp"),
            root,
        }
    }

    /// Create the directories
    pub async fn create(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.workspace).await?;
        tokio::fs::create_dir_all(&self.tools).await?;
        tokio::fs::create_dir_all(&self.temp).await?;
        Ok(())
    }

    /// `PATH` with the tools directory first
    pub fn path_var(&self) -> String {
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let paths = std::iter::once(self.tools.clone()).chain(std::env::split_paths(&inherited));
        match std::env::join_paths(paths) {
            Ok(joined) => joined.to_string_lossy().into_owned(),
            Err(_) => self.tools.display().to_string(),
        }
    }

    /// Environment every step of the job sees, before workflow `env:`
    pub fn base_env(&self, ctx: &JobContext) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("PATH".to_string(), self.path_var());
        env.insert(
            "GITHUB_WORKSPACE".to_string(),
            self.workspace.display().to_string(),
        );
        env.insert("RUNNER_TEMP".to_string(), self.temp.display().to_string());
        env.insert("TMPDIR".to_string(), self.temp.display().to_string());

        for (key, var) in [
            ("ref", "GITHUB_REF"),
            ("sha", "GITHUB_SHA"),
            ("event_name", "GITHUB_EVENT_NAME"),
            ("ref_name", "GITHUB_REF_NAME"),
            ("job", "GITHUB_JOB"),
        ] {
            if let Some(value) = ctx.github.get(key) {
                env.insert(var.to_string(), value.clone());
            }
        }
        env
    }
}
