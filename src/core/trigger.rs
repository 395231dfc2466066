//! Trigger events and the workflow's `on:` filter

use anyhow::{Context, Result};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Kind of event that can start a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A push to a branch
    Push,
    /// A pull request targeting a branch
    PullRequest,
}

impl EventKind {
    /// Name as written in a workflow's `on:` section
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }

    /// Parse a workflow event name. Returns `None` for events the runner does not emulate.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "push" => Some(EventKind::Push),
            "pull_request" => Some(EventKind::PullRequest),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A push or pull request targeting a named branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Event kind
    pub kind: EventKind,

    /// Target branch (the pushed branch, or the pull request's base branch)
    pub branch: String,

    /// Revision to check out; `None` means the source tree's current HEAD
    #[serde(default)]
    pub revision: Option<String>,
}

impl TriggerEvent {
    pub fn new(kind: EventKind, branch: impl Into<String>) -> Self {
        Self {
            kind,
            branch: branch.into(),
            revision: None,
        }
    }

    pub fn push(branch: impl Into<String>) -> Self {
        Self::new(EventKind::Push, branch)
    }

    pub fn pull_request(branch: impl Into<String>) -> Self {
        Self::new(EventKind::PullRequest, branch)
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Fully qualified ref of the target branch
    pub fn git_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }
}

/// `on:` section as written in YAML
///
/// Accepts `on: push`, `on: [push, pull_request]` and the mapping form
/// with per-event branch filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerConfig {
    Single(String),
    List(Vec<String>),
    Filtered(BTreeMap<String, serde_yaml::Value>),
}

/// Branch filters for one event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EventFilterConfig {
    #[serde(default)]
    pub branches: Vec<String>,

    #[serde(default)]
    pub branches_ignore: Vec<String>,
}

/// Compiled branch filter for one event kind
#[derive(Debug, Clone)]
pub struct BranchFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
    patterns: Vec<String>,
}

impl BranchFilter {
    /// Build a filter from include and ignore glob lists. Empty lists match everything.
    pub fn new(branches: &[String], branches_ignore: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile_globs(branches)?,
            exclude: compile_globs(branches_ignore)?,
            patterns: branches.to_vec(),
        })
    }

    /// A filter that matches every branch
    pub fn any() -> Self {
        Self {
            include: None,
            exclude: None,
            patterns: Vec::new(),
        }
    }

    pub fn matches(&self, branch: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .map_or(true, |set| set.is_match(branch));
        let excluded = self
            .exclude
            .as_ref()
            .is_some_and(|set| set.is_match(branch));
        included && !excluded
    }

    /// Include patterns, for display
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

fn add_unfiltered(events: &mut BTreeMap<EventKind, BranchFilter>, name: &str) {
    match EventKind::from_name(name) {
        Some(kind) => {
            events.insert(kind, BranchFilter::any());
        }
        None => debug!("Ignoring unsupported trigger event '{}'", name),
    }
}

// `*` stops at `/`, `**` crosses it, the way workflow branch filters behave.
fn compile_globs(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob: Glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("Invalid branch pattern '{}'", pattern))?;
        builder.add(glob);
    }
    Ok(Some(builder.build()?))
}

/// Which events (and branches) start the workflow
#[derive(Debug, Clone)]
pub struct TriggerFilter {
    events: BTreeMap<EventKind, BranchFilter>,
}

impl TriggerFilter {
    /// Compile the `on:` section. Events other than push and pull_request are ignored.
    pub fn from_config(config: &TriggerConfig) -> Result<Self> {
        let mut events = BTreeMap::new();

        match config {
            TriggerConfig::Single(name) => add_unfiltered(&mut events, name),
            TriggerConfig::List(names) => {
                for name in names {
                    add_unfiltered(&mut events, name);
                }
            }
            TriggerConfig::Filtered(map) => {
                for (name, filter) in map {
                    let Some(kind) = EventKind::from_name(name) else {
                        debug!("Ignoring unsupported trigger event '{}'", name);
                        continue;
                    };
                    let filter = if filter.is_null() {
                        BranchFilter::any()
                    } else {
                        let f: EventFilterConfig = serde_yaml::from_value(filter.clone())
                            .with_context(|| format!("Invalid filter for '{}'", name))?;
                        BranchFilter::new(&f.branches, &f.branches_ignore)
                            .with_context(|| format!("Invalid branch filter for '{}'", name))?
                    };
                    events.insert(kind, filter);
                }
            }
        }

        if events.is_empty() {
            anyhow::bail!("Workflow has no supported trigger event (expected push or pull_request)");
        }

        Ok(Self { events })
    }

    /// Whether the event starts a run
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        self.events
            .get(&event.kind)
            .is_some_and(|filter| filter.matches(&event.branch))
    }

    /// Event kinds with their branch filters
    pub fn events(&self) -> impl Iterator<Item = (&EventKind, &BranchFilter)> {
        self.events.iter()
    }
}
