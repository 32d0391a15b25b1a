// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`task`] defines [`TaskSpec`] and the [`Work`] capability.
//! - [`graph`] holds the directed acyclic graph of tasks.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks run, which are skipped, and when the run is done.
//! - [`run_state`] provides task states, run records and the run report.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] holds trigger-rule evaluation and state transitions.

pub mod graph;
pub mod run_state;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task;

pub use graph::{Graph, GraphBuilder};
pub use run_state::{DagRun, RunRecord, RunStatus, TaskState};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use state_manager::rule_satisfied;
pub use task::{NoopWork, ScheduledTask, TaskId, TaskSpec, Work, WorkFuture};
