//! Matrix strategy and its expansion into entries

use crate::core::config::scalar_to_string;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

const INCLUDE: &str = "include";
const EXCLUDE: &str = "exclude";

/// `strategy:` block of a job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StrategyConfig {
    /// Axes, plus optional `include` / `exclude` lists
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,

    /// Cancel sibling entries when one fails (runner default: off)
    #[serde(default)]
    pub fail_fast: Option<bool>,

    /// Upper bound on concurrently running entries of this job
    #[serde(default)]
    pub max_parallel: Option<usize>,
}

/// Raw `matrix:` mapping; declaration order of the axes is preserved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatrixConfig(Mapping);

impl MatrixConfig {
    /// Axes in declaration order with their values
    pub fn axes(&self) -> Result<Vec<(String, Vec<String>)>> {
        let mut axes = Vec::new();

        for (key, value) in &self.0 {
            let name = key.as_str().context("Matrix axis names must be strings")?;
            if name == INCLUDE || name == EXCLUDE {
                continue;
            }

            let Value::Sequence(items) = value else {
                bail!("Matrix axis '{}' must be a list", name);
            };
            if items.is_empty() {
                bail!("Matrix axis '{}' has no values", name);
            }

            let values = items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .with_context(|| format!("Matrix axis '{}' has a non-scalar value", name))
                })
                .collect::<Result<Vec<_>>>()?;
            axes.push((name.to_string(), values));
        }

        Ok(axes)
    }

    fn combinations(&self, key: &str) -> Result<Vec<BTreeMap<String, String>>> {
        let items = match self.0.get(key) {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Sequence(items)) => items,
            Some(_) => bail!("Matrix '{}' must be a list", key),
        };

        items
            .iter()
            .map(|item| {
                let Value::Mapping(map) = item else {
                    bail!("Matrix '{}' entries must be mappings", key);
                };
                map.iter()
                    .map(|(k, v)| {
                        let name = k
                            .as_str()
                            .with_context(|| format!("Matrix '{}' keys must be strings", key))?;
                        let value = scalar_to_string(v).with_context(|| {
                            format!("Matrix '{}' value for '{}' must be a scalar", key, name)
                        })?;
                        Ok((name.to_string(), value))
                    })
                    .collect()
            })
            .collect()
    }

    /// Expand into entries: cartesian product of the axes, minus `exclude`, plus `include`.
    ///
    /// An `include` object is merged into every product entry whose axis values it
    /// does not contradict; if it fits none, it becomes an entry of its own.
    pub fn expand(&self) -> Result<Vec<MatrixEntry>> {
        let axes = self.axes()?;
        let excludes = self.combinations(EXCLUDE)?;
        let includes = self.combinations(INCLUDE)?;
        let axis_names: Vec<&str> = axes.iter().map(|(name, _)| name.as_str()).collect();

        for exclude in &excludes {
            for key in exclude.keys() {
                if !axis_names.contains(&key.as_str()) {
                    bail!("Matrix exclude references unknown axis '{}'", key);
                }
            }
        }

        let mut entries: Vec<BTreeMap<String, String>> = if axes.is_empty() && !includes.is_empty() {
            Vec::new()
        } else {
            vec![BTreeMap::new()]
        };

        for (axis, values) in &axes {
            entries = entries
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |value| {
                        let mut entry = base.clone();
                        entry.insert(axis.clone(), value.clone());
                        entry
                    })
                })
                .collect();
        }

        entries.retain(|entry| {
            !excludes
                .iter()
                .any(|exclude| exclude.iter().all(|(k, v)| entry.get(k) == Some(v)))
        });

        let product_len = entries.len();
        for include in includes {
            let mut merged = false;
            for entry in entries[..product_len].iter_mut() {
                let compatible = include
                    .iter()
                    .all(|(k, v)| !axis_names.contains(&k.as_str()) || entry.get(k) == Some(v));
                if compatible {
                    entry.extend(include.iter().map(|(k, v)| (k.clone(), v.clone())));
                    merged = true;
                }
            }
            if !merged {
                entries.push(include);
            }
        }

        let entries: Vec<MatrixEntry> = entries.into_iter().map(MatrixEntry::new).collect();
        let mut labels = HashSet::new();
        for entry in &entries {
            let label = entry.label();
            if !labels.insert(label.clone()) {
                bail!("Matrix produces more than one entry labelled '{}'", label);
            }
        }

        Ok(entries)
    }
}

/// One combination of matrix values
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatrixEntry {
    values: BTreeMap<String, String>,
}

impl MatrixEntry {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn get(&self, axis: &str) -> Option<&str> {
        self.values.get(axis).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values only, comma separated (`3.10, ubuntu`)
    pub fn label(&self) -> String {
        self.values.values().cloned().collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for MatrixEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        f.write_str(&pairs.join(", "))
    }
}
