//! Built-in actions resolved to local commands

use crate::execution::{runner::CommandSpec, workspace::JobWorkspace};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

const CHECKOUT: &str = "actions/checkout";
const SETUP_PYTHON: &str = "actions/setup-python";

// $1 interpreter, $2 tools dir
const SETUP_PYTHON_SCRIPT: &str = r#"interpreter="$1"
tools="$2"
path=$(command -v "$interpreter") || { echo "$interpreter not found on PATH" >&2; exit 127; }
mkdir -p "$tools"
ln -sf "$path" "$tools/python"
ln -sf "$path" "$tools/python3"
printf '#!/bin/sh\nexec "%s" -m pip "$@"\n' "$path" > "$tools/pip"
chmod +x "$tools/pip"
cp "$tools/pip" "$tools/pip3"
"$path" --version
"#;

/// Errors resolving an action reference
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("unsupported action '{0}'")]
    Unsupported(String),

    #[error("invalid action reference '{0}'")]
    InvalidReference(String),

    #[error("invalid input '{input}' for {action}: {message}")]
    InvalidInput {
        action: String,
        input: String,
        message: String,
    },
}

/// `owner/name@version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    pub name: String,
    pub version: Option<String>,
}

impl ActionRef {
    pub fn parse(uses: &str) -> Result<Self, ActionError> {
        let uses = uses.trim();
        let (name, version) = match uses.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (uses, None),
        };

        if name.is_empty() || version.is_some_and(str::is_empty) {
            return Err(ActionError::InvalidReference(uses.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            version: version.map(str::to_string),
        })
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

/// Where an action operates
#[derive(Debug, Clone, Copy)]
pub struct ActionTarget<'a> {
    /// Source tree to check out from
    pub source_dir: &'a Path,
    pub workspace: &'a JobWorkspace,
    /// Triggering revision; `None` means the source's HEAD
    pub revision: Option<&'a str>,
}

/// Resolve an action with rendered inputs to the commands that implement it
pub fn resolve(
    uses: &str,
    with: &BTreeMap<String, String>,
    target: ActionTarget<'_>,
) -> Result<Vec<CommandSpec>, ActionError> {
    let action = ActionRef::parse(uses)?;

    match action.name.as_str() {
        CHECKOUT => Ok(checkout(with, target)),
        SETUP_PYTHON => setup_python(&action, with, target).map(|cmd| vec![cmd]),
        _ => Err(ActionError::Unsupported(action.to_string())),
    }
}

fn checkout(with: &BTreeMap<String, String>, target: ActionTarget<'_>) -> Vec<CommandSpec> {
    let workspace = target.workspace.workspace.display().to_string();
    let revision = with
        .get("ref")
        .filter(|r| !r.is_empty())
        .map(String::as_str)
        .or(target.revision)
        .unwrap_or("HEAD");

    vec![
        CommandSpec::new("git")
            .args(["clone", "--quiet", "--no-hardlinks"])
            .arg(target.source_dir.display().to_string())
            .arg(workspace.clone()),
        CommandSpec::new("git")
            .args(["-C", workspace.as_str()])
            .args(["checkout", "--quiet", "--detach"])
            .arg(revision),
    ]
}

fn setup_python(
    action: &ActionRef,
    with: &BTreeMap<String, String>,
    target: ActionTarget<'_>,
) -> Result<CommandSpec, ActionError> {
    let version = with.get("python-version").map(String::as_str).unwrap_or("");
    let interpreter = interpreter_for(version).ok_or_else(|| ActionError::InvalidInput {
        action: action.to_string(),
        input: "python-version".to_string(),
        message: format!("unrecognised version '{}'", version),
    })?;

    Ok(CommandSpec::new("sh")
        .args(["-e", "-c", SETUP_PYTHON_SCRIPT, "setup-python"])
        .arg(interpreter)
        .arg(target.workspace.tools.display().to_string()))
}

/// Interpreter executable for a `python-version` input
///
/// `3.10` → `python3.10`, `3` or `3.x` → `python3`, `pypy3.9` as given, empty → `python3`.
pub fn interpreter_for(version: &str) -> Option<String> {
    let version = version.trim();
    if version.is_empty() {
        return Some("python3".to_string());
    }
    if version.starts_with("pypy") {
        return Some(version.to_string());
    }

    let parts: Vec<&str> = version.split('.').collect();
    let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    match parts.as_slice() {
        [major] if numeric(major) => Some(format!("python{}", major)),
        [major, "x"] if numeric(major) => Some(format!("python{}", major)),
        [major, minor, ..] if numeric(major) && numeric(minor) => {
            Some(format!("python{}.{}", major, minor))
        }
        _ => None,
    }
}
