#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::NaiveDate;
use dagflow::config::{ConfigFile, DagSection, DefaultSection, RawConfigFile, TaskConfig};
use dagflow::context::RunContext;
use dagflow::TriggerRule;

/// Fixed logical date used by tests that render `{{ ds }}`.
pub fn test_run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).expect("valid date")
}

/// A run context with a fixed date and run id.
pub fn test_run_context(dag_id: &str) -> RunContext {
    RunContext::new(dag_id, test_run_date()).with_run_id("test__run")
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                dag: DagSection::default(),
                default: DefaultSection::default(),
                params: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_dag_id(mut self, id: &str) -> Self {
        self.config.dag.id = id.to_string();
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.config.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_default_retries(mut self, retries: u32) -> Self {
        self.config.default.retries = Some(retries);
        self
    }

    pub fn with_default_retry_delay(mut self, delay: &str) -> Self {
        self.config.default.retry_delay = Some(delay.to_string());
        self
    }

    /// The unvalidated config, for tests that exercise validation errors.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// A task without a command (no-op).
    pub fn noop() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(cmd.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.task.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: &str) -> Self {
        self.task.retry_delay = Some(delay.to_string());
        self
    }

    pub fn timeout(mut self, limit: &str) -> Self {
        self.task.timeout = Some(limit.to_string());
        self
    }

    pub fn trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.task.trigger_rule = Some(rule);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
