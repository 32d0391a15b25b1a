// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor backend
//!
//! The core can be unit tested without any Tokio, channels or processes.

use crate::dag::{DagRun, Scheduler};
use crate::engine::event_handlers::{handle_cancel, handle_start, handle_task_completion, CoreStep};
use crate::engine::RuntimeEvent;
use crate::errors::Result;

/// Pure core runtime state.
///
/// It owns the scheduler, has **no** channels, no Tokio types, and does not
/// perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Kick off the run.
    pub fn start(&mut self) -> Result<CoreStep> {
        handle_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> Result<CoreStep> {
        match event {
            RuntimeEvent::TaskCompleted(report) => {
                handle_task_completion(&mut self.scheduler, report)
            }
            RuntimeEvent::CancelRequested => Ok(handle_cancel(&mut self.scheduler)),
        }
    }

    /// Current run report.
    pub fn snapshot(&self) -> DagRun {
        self.scheduler.snapshot()
    }
}
