// src/config/compile.rs

//! Turn a validated [`ConfigFile`] into a [`Graph`].

use crate::config::model::{ConfigFile, TaskConfig};
use crate::dag::{Graph, TaskSpec};
use crate::errors::{DagflowError, Result};
use crate::exec::ShellWork;
use crate::types::parse_duration;

impl ConfigFile {
    /// Build the task graph declared by this config.
    ///
    /// Tasks with `cmd` run it through [`ShellWork`]; tasks without one are
    /// no-ops.
    pub fn build_graph(&self) -> Result<Graph> {
        let mut builder = Graph::builder(self.dag.id.clone());

        for (name, task) in self.task.iter() {
            builder = builder.task(self.task_spec(name, task)?);
            for dep in task.after.iter() {
                builder = builder.edge(dep, name);
            }
        }

        builder.build()
    }

    fn task_spec(&self, name: &str, task: &TaskConfig) -> Result<TaskSpec> {
        let mut spec = match task.cmd {
            Some(ref cmd) => TaskSpec::new(name, ShellWork::new(cmd.clone())),
            None => TaskSpec::noop(name),
        };

        spec = spec
            .with_retries(task.effective_retries(&self.default))
            .with_trigger_rule(task.effective_trigger_rule(&self.default));

        if let Some(delay) = task.effective_retry_delay(&self.default) {
            spec = spec.with_retry_delay(duration(name, "retry_delay", delay)?);
        }
        if let Some(limit) = task.effective_timeout(&self.default) {
            spec = spec.with_timeout(duration(name, "timeout", limit)?);
        }

        Ok(spec)
    }
}

fn duration(task: &str, field: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value).map_err(|e| {
        DagflowError::ConfigError(format!("task '{task}': invalid `{field}` '{value}': {e}"))
    })
}
