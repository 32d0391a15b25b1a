// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task::{ScheduledTask, TaskId};

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the DAG and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready and whose trigger rule is satisfied; they are
    /// now `Running` and should be handed to an executor.
    pub dispatched: Vec<ScheduledTask>,
    /// Tasks that were moved to `Skipped` in this step.
    pub skipped: Vec<TaskId>,
    /// Whether this step made every task terminal.
    pub run_just_finished: bool,
}

impl SchedulerStep {
    /// Ids of the dispatched tasks, in dispatch order.
    pub fn dispatched_names(&self) -> Vec<&str> {
        self.dispatched.iter().map(|t| t.name()).collect()
    }
}
