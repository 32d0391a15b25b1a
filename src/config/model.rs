// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::TriggerRule;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [dag]
/// id = "sales_analysis"
///
/// [default]
/// retries = 1
/// retry_delay = "5m"
///
/// [params]
/// data_dir = "/opt/data"
///
/// [task.start]
///
/// [task.load_customer]
/// cmd = "load {{ params.data_dir }}/customer.csv"
/// after = ["start"]
/// ```
///
/// All sections are optional and have reasonable defaults. This is the
/// unvalidated form; use [`ConfigFile::try_from`] (or the loader) to get a
/// [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub dag: DagSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// Run parameters, available as `{{ params.<name> }}`.
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// All tasks from `[task.<id>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A configuration that passed validation.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub dag: DagSection,
    pub default: DefaultSection,
    pub params: BTreeMap<String, String>,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    /// Assemble a config without validating it. Only `TryFrom<RawConfigFile>`
    /// should call this.
    pub(crate) fn new_unchecked(
        dag: DagSection,
        default: DefaultSection,
        params: BTreeMap<String, String>,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            dag,
            default,
            params,
            task,
        }
    }
}

/// `[dag]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DagSection {
    #[serde(default = "default_dag_id")]
    pub id: String,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_dag_id() -> String {
    "dagflow".to_string()
}

impl Default for DagSection {
    fn default() -> Self {
        Self {
            id: default_dag_id(),
            description: None,
        }
    }
}

/// `[default]` section: retry policy and trigger rule applied to tasks that
/// do not override them.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    #[serde(default)]
    pub retries: Option<u32>,

    /// Duration string such as `"5m"`.
    #[serde(default)]
    pub retry_delay: Option<String>,

    /// Per-attempt timeout, e.g. `"1h"`.
    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub trigger_rule: Option<TriggerRule>,
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskConfig {
    /// Shell command to execute. A task without `cmd` does nothing and
    /// succeeds (start markers, joins).
    #[serde(default)]
    pub cmd: Option<String>,

    /// Upstream tasks: this task waits until all of them are terminal.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub trigger_rule: Option<TriggerRule>,
}

impl TaskConfig {
    pub fn effective_retries(&self, default: &DefaultSection) -> u32 {
        self.retries.or(default.retries).unwrap_or(0)
    }

    pub fn effective_retry_delay<'a>(&'a self, default: &'a DefaultSection) -> Option<&'a str> {
        self.retry_delay
            .as_deref()
            .or(default.retry_delay.as_deref())
    }

    pub fn effective_timeout<'a>(&'a self, default: &'a DefaultSection) -> Option<&'a str> {
        self.timeout.as_deref().or(default.timeout.as_deref())
    }

    pub fn effective_trigger_rule(&self, default: &DefaultSection) -> TriggerRule {
        self.trigger_rule
            .or(default.trigger_rule)
            .unwrap_or_default()
    }
}
