// src/context.rs

//! Run-scoped context handed to every work function.
//!
//! A [`RunContext`] is created once per DAG run and shared (via `Arc`) by
//! every task of that run. Each attempt of a task receives a [`TaskContext`]
//! that adds the task id and attempt number on top.
//!
//! The [`ValueStore`] is the explicit replacement for ad hoc cross-task
//! variable passing: a task publishes values under its own id, descendants
//! read them by `(task, key)`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use serde_json::Value;

use crate::dag::TaskId;

/// Key under which the executor publishes a task's successful payload.
pub const RETURN_VALUE_KEY: &str = "return_value";

/// Per-run key/value exchange between tasks.
///
/// Cloning is cheap; all clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    inner: Arc<RwLock<HashMap<(TaskId, String), Value>>>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `value` under `(task, key)`, replacing any earlier value.
    pub fn push(&self, task: &str, key: &str, value: Value) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.insert((task.to_string(), key.to_string()), value);
    }

    /// Read the value `task` published under `key`.
    pub fn pull(&self, task: &str, key: &str) -> Option<Value> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.get(&(task.to_string(), key.to_string())).cloned()
    }

    /// Read the payload `task` returned on success.
    pub fn pull_return(&self, task: &str) -> Option<Value> {
        self.pull(task, RETURN_VALUE_KEY)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parameters shared by all tasks of one DAG run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub dag_id: String,
    pub run_id: String,
    /// Logical date the run is for (`{{ ds }}` in commands).
    pub run_date: NaiveDate,
    pub params: BTreeMap<String, String>,
    pub store: ValueStore,
}

impl RunContext {
    /// Create a context for a manual run of `dag_id` on `run_date`.
    pub fn new(dag_id: impl Into<String>, run_date: NaiveDate) -> Self {
        let dag_id = dag_id.into();
        let run_id = format!("manual__{}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f"));
        Self {
            dag_id,
            run_id,
            run_date,
            params: BTreeMap::new(),
            store: ValueStore::new(),
        }
    }

    /// Override the generated run id.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params.extend(params);
        self
    }

    /// Logical run date formatted as `YYYY-MM-DD`.
    pub fn ds(&self) -> String {
        self.run_date.format("%Y-%m-%d").to_string()
    }
}

/// Context for one attempt of one task.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run: Arc<RunContext>,
    pub task_id: TaskId,
    /// 1-based attempt number.
    pub attempt: u32,
}

impl TaskContext {
    pub fn new(run: Arc<RunContext>, task_id: impl Into<TaskId>, attempt: u32) -> Self {
        Self {
            run,
            task_id: task_id.into(),
            attempt,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.run.params.get(key).map(String::as_str)
    }

    /// Publish a value under this task's id.
    pub fn push(&self, key: &str, value: Value) {
        self.run.store.push(&self.task_id, key, value);
    }

    /// Read a value published by another task.
    pub fn pull(&self, task: &str, key: &str) -> Option<Value> {
        self.run.store.pull(task, key)
    }

    /// Read the successful payload of another task.
    pub fn pull_return(&self, task: &str) -> Option<Value> {
        self.run.store.pull_return(task)
    }
}
