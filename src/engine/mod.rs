// src/engine/mod.rs

//! Orchestration engine for dagflow.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the main runtime event loop that reacts to:
//!   - task completion reports from executors
//!   - cancellation requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use serde_json::Value;

use crate::dag::TaskId;

/// Final outcome of a task after all of its attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The work function succeeded with this payload.
    Success(Value),
    /// Every attempt failed; carries the last error message.
    Failed(String),
}

/// What an executor reports back for one dispatched task, exactly once.
///
/// State, attempt count, payload and error travel together so the scheduler
/// publishes them in a single write.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub task: TaskId,
    pub attempts: u32,
    pub outcome: TaskOutcome,
}

/// Events flowing into the runtime from executors and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched task finished (successfully or not).
    TaskCompleted(TaskReport),
    /// Stop dispatching; skip everything still pending.
    CancelRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use self::core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{run_dag, spawn_dag, CancelHandle, Runtime};
