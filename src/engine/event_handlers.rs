// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::debug;

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::TaskReport;
use crate::errors::Result;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Every task is terminal; the shell can stop and report.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute (dispatch tasks, exit).
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Handle the initial kickoff of a run.
pub fn handle_start(scheduler: &mut Scheduler) -> Result<CoreStep> {
    let step = scheduler.start()?;
    Ok(commands_for_step(scheduler, step))
}

/// Handle a task completion event.
pub fn handle_task_completion(scheduler: &mut Scheduler, report: TaskReport) -> Result<CoreStep> {
    let step = scheduler.complete(report)?;
    Ok(commands_for_step(scheduler, step))
}

/// Handle a cancellation request.
///
/// Pending tasks are skipped immediately; if tasks are still running the
/// shell keeps waiting for their reports.
pub fn handle_cancel(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.cancel();
    commands_for_step(scheduler, step)
}

/// Translate a scheduler step into shell commands.
fn commands_for_step(scheduler: &Scheduler, step: SchedulerStep) -> CoreStep {
    let mut commands = Vec::new();

    if !step.skipped.is_empty() {
        debug!(skipped = ?step.skipped, "tasks skipped in this step");
    }

    if !step.dispatched.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.dispatched));
    }

    let keep_running = !scheduler.is_finished();
    if !keep_running {
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
