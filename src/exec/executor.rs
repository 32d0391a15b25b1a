// src/exec/executor.rs

//! Runs a single task's work function with retry and backoff.

use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::context::{RunContext, TaskContext, RETURN_VALUE_KEY};
use crate::dag::TaskSpec;
use crate::engine::{TaskOutcome, TaskReport};
use crate::errors::{DagflowError, Result};

/// Stateless executor for one task of one run.
///
/// The executor invokes `spec.work`, retries failed attempts up to
/// `spec.max_retries` times with `spec.retry_delay` between them, and
/// produces exactly one [`TaskReport`]. It has no side effects of its own
/// beyond publishing a successful payload to the run's value store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor;

impl Executor {
    /// Run every attempt the retry policy allows and report the final outcome.
    pub async fn run(spec: &TaskSpec, run: Arc<RunContext>) -> TaskReport {
        let max_attempts = spec.max_attempts();
        let mut attempt = 1u32;

        loop {
            let ctx = TaskContext::new(Arc::clone(&run), spec.id.clone(), attempt);

            info!(
                task = %spec.id,
                run_id = %run.run_id,
                attempt,
                max_attempts,
                "starting attempt"
            );

            match run_attempt(spec, ctx).await {
                Ok(payload) => {
                    run.store.push(&spec.id, RETURN_VALUE_KEY, payload.clone());
                    info!(task = %spec.id, run_id = %run.run_id, attempt, "attempt succeeded");
                    return TaskReport {
                        task: spec.id.clone(),
                        attempts: attempt,
                        outcome: TaskOutcome::Success(payload),
                    };
                }
                Err(e) => {
                    let message = format!("{e:#}");

                    if attempt >= max_attempts {
                        error!(
                            task = %spec.id,
                            run_id = %run.run_id,
                            attempt,
                            error = %message,
                            "attempt failed; no retries left"
                        );
                        return TaskReport {
                            task: spec.id.clone(),
                            attempts: attempt,
                            outcome: TaskOutcome::Failed(message),
                        };
                    }

                    warn!(
                        task = %spec.id,
                        run_id = %run.run_id,
                        attempt,
                        max_attempts,
                        error = %message,
                        delay_ms = spec.retry_delay.as_millis() as u64,
                        "attempt failed; retrying"
                    );

                    if !spec.retry_delay.is_zero() {
                        sleep(spec.retry_delay).await;
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Like [`Executor::run`], but returns the payload or a
    /// [`DagflowError::TaskExecution`].
    pub async fn execute(spec: &TaskSpec, run: Arc<RunContext>) -> Result<Value> {
        let report = Self::run(spec, run).await;
        match report.outcome {
            TaskOutcome::Success(payload) => Ok(payload),
            TaskOutcome::Failed(message) => Err(DagflowError::TaskExecution {
                task: report.task,
                attempts: report.attempts,
                message,
            }),
        }
    }
}

/// Run one attempt in its own Tokio task so that a panicking work function
/// is reported as a failed attempt. `call` itself runs inside the task too,
/// since a work function may panic before returning its future.
async fn run_attempt(spec: &TaskSpec, ctx: TaskContext) -> anyhow::Result<Value> {
    let work = Arc::clone(&spec.work);
    let limit = spec.timeout;

    let handle = tokio::spawn(async move {
        let fut = work.call(ctx);
        match limit {
            Some(limit) => match timeout(limit, fut).await {
                Ok(res) => res,
                Err(_) => Err(anyhow!("attempt timed out after {limit:?}")),
            },
            None => fut.await,
        }
    });

    match handle.await {
        Ok(res) => res,
        Err(join_err) if join_err.is_panic() => {
            debug!(task = %spec.id, "work function panicked");
            Err(anyhow!("work function panicked"))
        }
        Err(join_err) => Err(anyhow!("work function was cancelled: {join_err}")),
    }
}
