use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::Graph;
use crate::dag::run_state::{DagRun, RunRecord, RunStatus, TaskState};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{upstreams_terminal, StateManager};
use crate::dag::task::TaskId;
use crate::engine::TaskReport;
use crate::errors::{DagflowError, Result};

/// Scheduler holds the validated DAG plus the per-run task records.
///
/// It is responsible for:
/// - computing which pending tasks have all upstream tasks terminal
/// - evaluating each ready task's trigger rule (dispatch or skip)
/// - recording executor reports
/// - detecting completion and stalls
///
/// The scheduler is synchronous and performs no IO; the async runtime feeds
/// it completion reports and dispatches whatever it returns.
#[derive(Debug)]
pub struct Scheduler {
    graph: Graph,
    records: HashMap<TaskId, RunRecord>,
    run_id: String,
    started: bool,
    cancelled: bool,
    finished: bool,
}

impl Scheduler {
    /// Construct a scheduler for one run of `graph`.
    ///
    /// The graph is validated here; a cyclic graph is rejected.
    pub fn new(graph: Graph, run_id: impl Into<String>) -> Result<Self> {
        graph.validate()?;

        let records = graph
            .tasks()
            .map(|id| (id.to_string(), RunRecord::default()))
            .collect();

        Ok(Self {
            graph,
            records,
            run_id: run_id.into(),
            started: false,
            cancelled: false,
            finished: false,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns `true` once every task is terminal.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.records.get(task).map(|r| r.state)
    }

    pub fn record(&self, task: &str) -> Option<&RunRecord> {
        self.records.get(task)
    }

    /// Whether every upstream task of `task` is terminal.
    ///
    /// Returns `None` if the task is unknown.
    pub fn upstreams_terminal(&self, task: &str) -> Option<bool> {
        if !self.records.contains_key(task) {
            return None;
        }
        Some(upstreams_terminal(&self.graph, &self.records, task))
    }

    /// Ids of tasks currently in `state`, sorted.
    pub fn tasks_in_state(&self, state: TaskState) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .records
            .iter()
            .filter(|(_, r)| r.state == state)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Overall status: `Running` until every task is terminal, then `Failed`
    /// iff any task failed.
    pub fn status(&self) -> RunStatus {
        if !self.finished {
            RunStatus::Running
        } else if self.records.values().any(|r| r.state == TaskState::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Success
        }
    }

    /// Snapshot of the run for reporting.
    pub fn snapshot(&self) -> DagRun {
        DagRun {
            dag_id: self.graph.dag_id().to_string(),
            run_id: self.run_id.clone(),
            status: self.status(),
            cancelled: self.cancelled,
            records: self
                .records
                .iter()
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
        }
    }

    /// Initial kickoff: resolve the root tasks.
    pub fn start(&mut self) -> Result<SchedulerStep> {
        if self.started {
            warn!(run_id = %self.run_id, "start called twice; ignoring");
            return Ok(SchedulerStep::default());
        }
        self.started = true;

        info!(
            dag = %self.graph.dag_id(),
            run_id = %self.run_id,
            tasks = self.graph.len(),
            "starting DAG run"
        );

        self.tick()
    }

    /// Record an executor report and resolve whatever it unblocked.
    pub fn complete(&mut self, report: TaskReport) -> Result<SchedulerStep> {
        if !self.started {
            warn!(task = %report.task, "completion before run start; ignoring");
            return Ok(SchedulerStep::default());
        }

        let mut manager = StateManager::new(&self.graph, &mut self.records, &self.run_id);
        if !manager.apply_report(report) {
            return Ok(SchedulerStep::default());
        }

        self.tick()
    }

    /// Cancel the run: every pending task is skipped. Running tasks keep
    /// going and their reports are still recorded.
    pub fn cancel(&mut self) -> SchedulerStep {
        if self.finished {
            debug!(run_id = %self.run_id, "cancel after run finished; nothing to do");
            return SchedulerStep::default();
        }

        self.cancelled = true;

        let mut manager = StateManager::new(&self.graph, &mut self.records, &self.run_id);
        let skipped = manager.skip_pending();
        info!(
            run_id = %self.run_id,
            skipped = skipped.len(),
            "run cancelled; pending tasks skipped"
        );

        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            dispatched: Vec::new(),
            skipped,
            run_just_finished,
        }
    }

    /// One scheduling tick: dispatch or skip every ready task, then check for
    /// completion or a stall.
    fn tick(&mut self) -> Result<SchedulerStep> {
        let allow_dispatch = !self.cancelled;
        let mut manager = StateManager::new(&self.graph, &mut self.records, &self.run_id);
        let (dispatched, skipped) = manager.resolve_ready_tasks(allow_dispatch);

        let run_just_finished = self.maybe_finish_run();

        if !self.finished && self.tasks_in_state(TaskState::Running).is_empty() {
            let pending = self.tasks_in_state(TaskState::Pending);
            return Err(DagflowError::StalledRun(format!(
                "no task is running but {} task(s) remain pending: {}",
                pending.len(),
                pending.join(", ")
            )));
        }

        Ok(SchedulerStep {
            dispatched,
            skipped,
            run_just_finished,
        })
    }

    /// Mark the run finished once every task is terminal.
    ///
    /// Returns `true` if this call made the transition.
    fn maybe_finish_run(&mut self) -> bool {
        if self.finished {
            return false;
        }

        let manager = StateManager::new(&self.graph, &mut self.records, &self.run_id);

        if manager.all_tasks_terminal() {
            self.finished = true;
            info!(
                run_id = %self.run_id,
                status = %self.status(),
                "all tasks terminal; marking run as finished"
            );
            true
        } else {
            false
        }
    }
}
