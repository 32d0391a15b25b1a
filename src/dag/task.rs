// src/dag/task.rs

//! Task definitions: the immutable [`TaskSpec`] and the [`Work`] capability.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::context::TaskContext;
use crate::types::TriggerRule;

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// Boxed future returned by a work function.
pub type WorkFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'static>>;

/// The unit of work a task performs.
///
/// Any `Fn(TaskContext) -> impl Future<Output = anyhow::Result<Value>>`
/// closure implements this trait, so most callers never implement it by hand.
/// Side effects (talking to databases, files, mail servers) belong here; the
/// executor only adds retry bookkeeping around the call.
pub trait Work: Send + Sync {
    fn call(&self, ctx: TaskContext) -> WorkFuture;
}

impl<F, Fut> Work for F
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn call(&self, ctx: TaskContext) -> WorkFuture {
        Box::pin(self(ctx))
    }
}

/// Work that does nothing and succeeds with `null`.
///
/// Used for start markers and join points.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWork;

impl Work for NoopWork {
    fn call(&self, _ctx: TaskContext) -> WorkFuture {
        Box::pin(async { Ok(Value::Null) })
    }
}

/// Immutable definition of one task.
#[derive(Clone)]
pub struct TaskSpec {
    pub id: TaskId,
    pub work: Arc<dyn Work>,
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub trigger_rule: TriggerRule,
    /// Per-attempt limit; `None` means unbounded.
    pub timeout: Option<Duration>,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, work: impl Work + 'static) -> Self {
        Self {
            id: id.into(),
            work: Arc::new(work),
            max_retries: 0,
            retry_delay: Duration::ZERO,
            trigger_rule: TriggerRule::default(),
            timeout: None,
        }
    }

    /// A task that performs no work (start markers, joins).
    pub fn noop(id: impl Into<TaskId>) -> Self {
        Self::new(id, NoopWork)
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.trigger_rule = rule;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Total number of attempts the executor may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("id", &self.id)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("trigger_rule", &self.trigger_rule)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Description of a task that the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub spec: Arc<TaskSpec>,
    /// Identifier of the DAG run the task belongs to.
    pub run_id: String,
}

impl ScheduledTask {
    pub fn name(&self) -> &str {
        &self.spec.id
    }
}
