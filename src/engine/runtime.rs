// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::context::RunContext;
use crate::dag::{DagRun, Graph, ScheduledTask, Scheduler};
use crate::errors::{DagflowError, Error, Result};
use crate::exec::{ExecutorBackend, TokioExecutorBackend};

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Drives the DAG scheduler in response to `RuntimeEvent`s,
/// and delegates actual task execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels and dispatching tasks to the executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Kicks off the run.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them into the core.
    /// - Executes commands returned by the core (dispatch tasks, exit).
    ///
    /// Returns the final run report once every task is terminal.
    pub async fn run(mut self) -> Result<DagRun> {
        info!(run_id = %self.core.scheduler().run_id(), "dagflow runtime started");

        let mut step = self.core.start()?;

        loop {
            let mut exit = false;
            for command in step.commands {
                exit |= self.execute_command(command).await?;
            }

            if exit || !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }

            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    return Err(DagflowError::StalledRun(
                        "runtime event channel closed before all tasks finished".to_string(),
                    ));
                }
            };

            debug!(?event, "runtime received event");

            step = self.core.step(event)?;
        }

        let report = self.core.snapshot();
        info!(
            run_id = %report.run_id,
            status = %report.status,
            "runtime exiting"
        );
        Ok(report)
    }

    /// Execute a single command from the core.
    ///
    /// Returns `true` if the core asked the shell to stop.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<bool> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
                Ok(false)
            }
            CoreCommand::RequestExit => {
                debug!("core issued RequestExit command");
                Ok(true)
            }
        }
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name()).collect();
        debug!(?names, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}

/// Handle used to cancel a DAG run started with [`spawn_dag`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl CancelHandle {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { tx }
    }

    /// Request cancellation: pending tasks are skipped, running tasks finish
    /// their current attempt.
    pub async fn cancel(&self) -> Result<()> {
        self.tx
            .send(RuntimeEvent::CancelRequested)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

/// Run `graph` to completion with the Tokio executor backend.
pub async fn run_dag(graph: Graph, ctx: RunContext) -> Result<DagRun> {
    let (_cancel, handle) = spawn_dag(graph, ctx)?;
    handle.await.map_err(Error::from)?
}

/// Start a run of `graph` in the background.
///
/// Returns a [`CancelHandle`] and the join handle resolving to the final run
/// report. Fails immediately if the graph does not validate.
pub fn spawn_dag(
    graph: Graph,
    ctx: RunContext,
) -> Result<(CancelHandle, JoinHandle<Result<DagRun>>)> {
    let scheduler = Scheduler::new(graph, ctx.run_id.clone())?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = TokioExecutorBackend::new(rt_tx.clone(), Arc::new(ctx));
    let core = CoreRuntime::new(scheduler);
    let runtime = Runtime::new(core, rt_rx, executor);

    let handle = tokio::spawn(runtime.run());
    Ok((CancelHandle::new(rt_tx), handle))
}
