// src/dag/run_state.rs

//! Per-task and per-run state types.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::dag::task::TaskId;

/// State of one task within a DAG run.
///
/// `Success`, `Failed` and `Skipped` are terminal and never change once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting for upstream tasks to become terminal.
    Pending,
    /// Dispatched to an executor.
    Running,
    Success,
    Failed,
    /// Trigger rule was not satisfied (or the run was cancelled); never ran.
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failed | TaskState::Skipped
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Mutable record of one task in one DAG run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub state: TaskState,
    /// Number of times the work function was invoked.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub payload: Option<Value>,
}

impl Default for RunRecord {
    fn default() -> Self {
        Self {
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
            payload: None,
        }
    }
}

/// Overall status of a DAG run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of a DAG run: overall status plus every task's record.
#[derive(Debug, Clone)]
pub struct DagRun {
    pub dag_id: String,
    pub run_id: String,
    pub status: RunStatus,
    /// Whether the run was cancelled before it finished on its own.
    pub cancelled: bool,
    pub records: BTreeMap<TaskId, RunRecord>,
}

impl DagRun {
    pub fn record(&self, task: &str) -> Option<&RunRecord> {
        self.records.get(task)
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.records.get(task).map(|r| r.state)
    }

    /// Ids of tasks that ended in `state`, in id order.
    pub fn tasks_in_state(&self, state: TaskState) -> Vec<&str> {
        self.records
            .iter()
            .filter(|(_, r)| r.state == state)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.records.values().all(|r| r.state.is_terminal())
    }
}

impl fmt::Display for DagRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dag {} run {}: {}", self.dag_id, self.run_id, self.status)?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        writeln!(f)?;

        let width = self.records.keys().map(|k| k.len()).max().unwrap_or(0);
        for (id, record) in &self.records {
            write!(
                f,
                "  {id:<width$}  {:<8} attempts={}",
                record.state.to_string(),
                record.attempts
            )?;
            if let Some(ref err) = record.last_error {
                write!(f, "  error: {err}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
