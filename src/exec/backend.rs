// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning work itself.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor in [`executor`](super::executor).
//!
//! - `TokioExecutorBackend` is the default implementation. Every dispatched
//!   task gets its own Tokio task running [`Executor::run`], whose report is
//!   sent back to the runtime as `RuntimeEvent::TaskCompleted`. If that task
//!   dies, a `Failed` report is sent in its place.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were dispatched and directly emits scripted reports.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::context::RunContext;
use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome, TaskReport};
use crate::errors::Result;

use super::executor::Executor;

/// Trait abstracting how scheduled tasks are executed.
///
/// Production code uses [`TokioExecutorBackend`]; tests can provide their own
/// implementation that doesn't run real work.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Implementations must eventually emit exactly one
    /// `RuntimeEvent::TaskCompleted` per task and must not block on the
    /// tasks themselves.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Executor backend used in production.
pub struct TokioExecutorBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    run: Arc<RunContext>,
}

impl TokioExecutorBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, run: Arc<RunContext>) -> Self {
        Self { runtime_tx, run }
    }
}

impl ExecutorBackend for TokioExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone what the spawned tasks need so the future doesn't borrow `self`.
        let tx = self.runtime_tx.clone();
        let run = Arc::clone(&self.run);

        Box::pin(async move {
            for task in tasks {
                let tx = tx.clone();
                let run = Arc::clone(&run);

                tokio::spawn(async move {
                    let spec = Arc::clone(&task.spec);
                    let report = match tokio::spawn(async move { Executor::run(&spec, run).await })
                        .await
                    {
                        Ok(report) => report,
                        Err(join_err) => {
                            warn!(
                                task = %task.name(),
                                run_id = %task.run_id,
                                error = %join_err,
                                "executor task died; reporting the task as failed"
                            );
                            TaskReport {
                                task: task.name().to_string(),
                                attempts: 1,
                                outcome: TaskOutcome::Failed(format!("executor task died: {join_err}")),
                            }
                        }
                    };
                    if tx.send(RuntimeEvent::TaskCompleted(report)).await.is_err() {
                        debug!(
                            task = %task.name(),
                            run_id = %task.run_id,
                            "runtime gone before task report could be delivered"
                        );
                    }
                });
            }
            Ok(())
        })
    }
}
