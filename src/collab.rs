// src/collab.rs

//! Contracts for the external systems that work functions talk to, plus
//! work adapters that wrap them.
//!
//! The orchestration core never calls these directly. They exist so that a
//! typical "load, query, validate, notify" pipeline can be declared in code
//! with the collaborators supplied by the caller (a real database client in
//! production, in-memory fakes in tests).
//!
//! Values exchanged through the run's [`ValueStore`](crate::context::ValueStore):
//! - loaders and query runners publish their row count under
//!   [`ROW_COUNT_KEY`];
//! - the row-count check publishes its failure message under
//!   [`ERROR_MESSAGE_KEY`] before failing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::{json, Value};
use tokio::task::spawn_blocking;
use tracing::{info, warn};

use crate::context::TaskContext;
use crate::dag::{TaskId, Work};

pub const ROW_COUNT_KEY: &str = "row_count";
pub const ERROR_MESSAGE_KEY: &str = "error_message";

/// Loads a source file into a table, replacing its previous contents.
///
/// Full-replace semantics make a retried load idempotent.
pub trait BulkLoader: Send + Sync {
    /// Returns the number of rows loaded.
    fn load_table(&self, source: &Path, table: &str) -> Result<u64>;
}

/// Runs a query and writes its result set to a named output artifact.
pub trait QueryRunner: Send + Sync {
    /// Returns the number of rows written to `artifact`.
    fn run_query(&self, sql: &str, artifact: &str) -> Result<u64>;
}

/// Sends a notification. Delivery is best effort.
pub trait Notifier: Send + Sync {
    fn notify(&self, channel: &str, subject: &str, body: &str) -> Result<()>;
}

/// Notifier that only writes the notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, channel: &str, subject: &str, body: &str) -> Result<()> {
        warn!(channel = %channel, subject = %subject, "{}", body);
        Ok(())
    }
}

/// Work that bulk-loads `source` into `table`.
pub fn load_table_work(
    loader: Arc<dyn BulkLoader>,
    source: impl Into<PathBuf>,
    table: impl Into<String>,
) -> impl Work {
    let source = source.into();
    let table = table.into();

    move |ctx: TaskContext| {
        let loader = Arc::clone(&loader);
        let source = source.clone();
        let table = table.clone();

        async move {
            let rows = {
                let table = table.clone();
                spawn_blocking(move || loader.load_table(&source, &table)).await??
            };
            info!(task = %ctx.task_id, table = %table, rows, "table loaded");
            ctx.push(ROW_COUNT_KEY, json!(rows));
            Ok::<_, anyhow::Error>(json!({ "table": table, "rows": rows }))
        }
    }
}

/// Work that runs `sql` and writes the result to `artifact`.
pub fn query_work(
    runner: Arc<dyn QueryRunner>,
    sql: impl Into<String>,
    artifact: impl Into<String>,
) -> impl Work {
    let sql = sql.into();
    let artifact = artifact.into();

    move |ctx: TaskContext| {
        let runner = Arc::clone(&runner);
        let sql = sql.clone();
        let artifact = artifact.clone();

        async move {
            let rows = {
                let artifact = artifact.clone();
                spawn_blocking(move || runner.run_query(&sql, &artifact)).await??
            };
            info!(task = %ctx.task_id, artifact = %artifact, rows, "query finished");
            ctx.push(ROW_COUNT_KEY, json!(rows));
            Ok::<_, anyhow::Error>(json!({ "artifact": artifact, "rows": rows }))
        }
    }
}

/// Work that fails unless every `(task, artifact)` pair reported at least
/// one row.
///
/// A task that published no row count counts as zero rows. On failure the
/// message (naming every empty artifact) is published under
/// [`ERROR_MESSAGE_KEY`] so a failure branch can include it.
pub fn row_count_check(expected: Vec<(TaskId, String)>) -> impl Work {
    move |ctx: TaskContext| {
        let expected = expected.clone();

        async move {
            let mut counts = serde_json::Map::new();
            let mut empty = Vec::new();

            for (task, artifact) in &expected {
                let rows = ctx
                    .pull(task, ROW_COUNT_KEY)
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                info!(task = %ctx.task_id, artifact = %artifact, rows, "checked row count");
                if rows == 0 {
                    empty.push(artifact.as_str());
                }
                counts.insert(artifact.clone(), json!(rows));
            }

            if !empty.is_empty() {
                let message = format!("queries returned 0 rows: {}", empty.join(", "));
                ctx.push(ERROR_MESSAGE_KEY, json!(message));
                bail!(message);
            }

            Ok::<_, anyhow::Error>(Value::Object(counts))
        }
    }
}

/// Work that sends one notification and never fails.
///
/// If `reason_from` is set and that task published an
/// [`ERROR_MESSAGE_KEY`], the message is appended to the body.
pub fn notify_work(
    notifier: Arc<dyn Notifier>,
    channel: impl Into<String>,
    subject: impl Into<String>,
    body: impl Into<String>,
    reason_from: Option<TaskId>,
) -> impl Work {
    let channel = channel.into();
    let subject = subject.into();
    let body = body.into();

    move |ctx: TaskContext| {
        let notifier = Arc::clone(&notifier);
        let channel = channel.clone();
        let subject = subject.clone();
        let mut body = body.clone();
        let reason_from = reason_from.clone();

        async move {
            let reason = reason_from
                .as_deref()
                .and_then(|task| ctx.pull(task, ERROR_MESSAGE_KEY))
                .and_then(|v| v.as_str().map(str::to_string));
            if let Some(ref reason) = reason {
                body.push_str("\nReason: ");
                body.push_str(reason);
            }

            let sent = {
                let channel = channel.clone();
                spawn_blocking(move || notifier.notify(&channel, &subject, &body)).await
            };

            match sent {
                Ok(Ok(())) => info!(task = %ctx.task_id, channel = %channel, "notification sent"),
                Ok(Err(e)) => warn!(
                    task = %ctx.task_id,
                    channel = %channel,
                    error = %e,
                    "notification failed; continuing"
                ),
                Err(e) => warn!(
                    task = %ctx.task_id,
                    channel = %channel,
                    error = %e,
                    "notifier panicked; continuing"
                ),
            }

            Ok::<_, anyhow::Error>(json!({ "channel": channel, "reason": reason }))
        }
    }
}
