// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::Graph;
use crate::dag::run_state::{RunRecord, TaskState};
use crate::dag::task::{ScheduledTask, TaskId};
use crate::engine::{TaskOutcome, TaskReport};
use crate::types::TriggerRule;

/// Decide whether `rule` lets a task run given the terminal states of its
/// immediate upstream tasks.
///
/// Only called once every upstream state is terminal. A task without
/// upstream tasks always runs.
pub fn rule_satisfied(rule: TriggerRule, upstream: &[TaskState]) -> bool {
    if upstream.is_empty() {
        return true;
    }

    match rule {
        TriggerRule::AllSuccess => upstream.iter().all(|s| *s == TaskState::Success),
        TriggerRule::OneFailed => upstream.iter().any(|s| *s == TaskState::Failed),
        TriggerRule::AllDone => upstream.iter().all(|s| s.is_terminal()),
    }
}

/// Whether every upstream task of `task` has reached a terminal state.
pub fn upstreams_terminal(graph: &Graph, records: &HashMap<TaskId, RunRecord>, task: &str) -> bool {
    graph.upstream_of(task).iter().all(|up| match records.get(up) {
        Some(rec) => rec.state.is_terminal(),
        None => {
            warn!(task = %task, upstream = %up, "upstream missing from run records");
            false
        }
    })
}

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a Graph,
    records: &'a mut HashMap<TaskId, RunRecord>,
    run_id: &'a str,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a Graph,
        records: &'a mut HashMap<TaskId, RunRecord>,
        run_id: &'a str,
    ) -> Self {
        Self {
            graph,
            records,
            run_id,
        }
    }

    /// Resolve every `Pending` task whose upstream tasks are all terminal.
    ///
    /// Tasks whose trigger rule holds become `Running` and are returned for
    /// dispatch; the rest become `Skipped`. A skip may unblock further tasks,
    /// so this repeats until a round produces no skip. With `allow_dispatch`
    /// unset (cancelled run) every ready task is skipped.
    pub fn resolve_ready_tasks(&mut self, allow_dispatch: bool) -> (Vec<ScheduledTask>, Vec<TaskId>) {
        let mut dispatched = Vec::new();
        let mut skipped = Vec::new();

        loop {
            // Decide first, then mutate to avoid borrowing issues.
            let candidates: Vec<TaskId> = self
                .graph
                .tasks()
                .filter(|id| {
                    matches!(
                        self.records.get(*id).map(|r| r.state),
                        Some(TaskState::Pending)
                    ) && upstreams_terminal(self.graph, &*self.records, id)
                })
                .map(|id| id.to_string())
                .collect();

            if candidates.is_empty() {
                break;
            }

            let mut skipped_this_round = false;

            for name in candidates {
                let Some(spec) = self.graph.task(&name) else {
                    continue;
                };
                let upstream_states = self.upstream_states(&name);
                let run_it =
                    allow_dispatch && rule_satisfied(spec.trigger_rule, &upstream_states);

                let Some(record) = self.records.get_mut(&name) else {
                    continue;
                };

                if run_it {
                    info!(
                        task = %name,
                        run_id = %self.run_id,
                        rule = %spec.trigger_rule,
                        "upstream resolved; dispatching task"
                    );
                    record.state = TaskState::Running;
                    dispatched.push(ScheduledTask {
                        spec: spec.clone(),
                        run_id: self.run_id.to_string(),
                    });
                } else {
                    info!(
                        task = %name,
                        run_id = %self.run_id,
                        rule = %spec.trigger_rule,
                        ?upstream_states,
                        "trigger rule not satisfied; skipping task"
                    );
                    record.state = TaskState::Skipped;
                    skipped.push(name);
                    skipped_this_round = true;
                }
            }

            if !skipped_this_round {
                break;
            }
        }

        (dispatched, skipped)
    }

    /// Record the final outcome reported by the executor of a task.
    ///
    /// Returns `false` (and changes nothing) if the task is unknown or not
    /// currently `Running`; terminal states are never overwritten.
    pub fn apply_report(&mut self, report: TaskReport) -> bool {
        let Some(record) = self.records.get_mut(&report.task) else {
            warn!(task = %report.task, "completion for unknown task; ignoring");
            return false;
        };

        if record.state != TaskState::Running {
            warn!(
                task = %report.task,
                state = %record.state,
                "completion for task that is not running; ignoring"
            );
            return false;
        }

        let updated = match report.outcome {
            TaskOutcome::Success(payload) => {
                debug!(
                    task = %report.task,
                    run_id = %self.run_id,
                    attempts = report.attempts,
                    "task completed successfully"
                );
                RunRecord {
                    state: TaskState::Success,
                    attempts: report.attempts,
                    last_error: None,
                    payload: Some(payload),
                }
            }
            TaskOutcome::Failed(error) => {
                warn!(
                    task = %report.task,
                    run_id = %self.run_id,
                    attempts = report.attempts,
                    error = %error,
                    "task failed"
                );
                RunRecord {
                    state: TaskState::Failed,
                    attempts: report.attempts,
                    last_error: Some(error),
                    payload: None,
                }
            }
        };

        *record = updated;
        true
    }

    /// Move every `Pending` task to `Skipped`.
    pub fn skip_pending(&mut self) -> Vec<TaskId> {
        let mut skipped: Vec<TaskId> = self
            .records
            .iter_mut()
            .filter(|(_, r)| r.state == TaskState::Pending)
            .map(|(id, r)| {
                r.state = TaskState::Skipped;
                id.clone()
            })
            .collect();
        skipped.sort();
        skipped
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.records.values().all(|r| r.state.is_terminal())
    }

    fn upstream_states(&self, task: &str) -> Vec<TaskState> {
        self.graph
            .upstream_of(task)
            .iter()
            .filter_map(|up| self.records.get(up).map(|r| r.state))
            .collect()
    }
}
