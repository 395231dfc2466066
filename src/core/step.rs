//! Step domain model

use crate::core::{
    config::{string_map, StepConfig},
    context::JobContext,
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// A reusable action, e.g. `actions/checkout@v2`
    Uses {
        action: String,
        with: BTreeMap<String, String>,
    },
    /// A shell script
    Run {
        script: String,
        working_directory: Option<String>,
    },
}

/// A single step of a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Position in the job, starting at 0
    pub index: usize,

    pub id: Option<String>,

    /// Name template; may contain expressions
    pub name: Option<String>,

    pub action: StepAction,

    pub env: BTreeMap<String, String>,

    /// Step timeout; falls back to the job's
    pub timeout_secs: Option<u64>,
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, index: usize) -> Result<Self> {
        let action = match (&config.uses, &config.run) {
            (Some(uses), None) => StepAction::Uses {
                action: uses.trim().to_string(),
                with: string_map(&config.with, "Step input")?,
            },
            (None, Some(script)) => StepAction::Run {
                script: script.clone(),
                working_directory: config.working_directory.clone(),
            },
            _ => anyhow::bail!("Step #{} needs exactly one of 'uses' or 'run'", index + 1),
        };

        Ok(Step {
            index,
            id: config.id.clone(),
            name: config.name.clone(),
            action,
            env: string_map(&config.env, "Step env")
                .with_context(|| format!("Step #{}", index + 1))?,
            timeout_secs: config.timeout_minutes.map(|m| m * 60),
        })
    }

    /// Name shown when the step has none of its own
    pub fn default_name(&self) -> String {
        match &self.action {
            StepAction::Uses { action, .. } => format!("Run {}", action),
            StepAction::Run { script, .. } => {
                let first_line = script.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
                format!("Run {}", first_line.trim())
            }
        }
    }

    /// Rendered display name
    pub fn display_name(&self, ctx: &JobContext) -> String {
        match &self.name {
            Some(name) => ctx.render(name),
            None => self.default_name(),
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self.action, StepAction::Uses { .. })
    }

    /// One-line summary of the command, with expressions rendered
    pub fn describe(&self, ctx: &JobContext) -> String {
        match &self.action {
            StepAction::Uses { action, with } => {
                if with.is_empty() {
                    action.clone()
                } else {
                    let inputs: Vec<String> = with
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, ctx.render(v)))
                        .collect();
                    format!("{} ({})", action, inputs.join(", "))
                }
            }
            StepAction::Run { script, .. } => ctx.render(script.trim()),
        }
    }
}
