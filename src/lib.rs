// src/lib.rs

pub mod cli;
pub mod collab;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, ConfigFile};
use crate::context::RunContext;
use crate::dag::{Graph, RunStatus};
use crate::engine::spawn_dag;
use crate::errors::{Error, Result};

pub use crate::context::{TaskContext, ValueStore};
pub use crate::dag::{DagRun, GraphBuilder, TaskSpec, TaskState};
pub use crate::errors::DagflowError;
pub use crate::types::TriggerRule;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and graph construction
/// - the run context (run date, params)
/// - scheduler / runtime / executor
/// - Ctrl-C handling (cancels the run)
///
/// Prints the run report to stdout and returns the final status.
pub async fn run(args: CliArgs) -> Result<RunStatus> {
    let cfg = load_and_validate(&args.config)?;
    let graph = cfg.build_graph()?;

    if args.dry_run {
        print_dry_run(&cfg, &graph)?;
        return Ok(RunStatus::Success);
    }

    let run_date = args
        .run_date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let ctx = RunContext::new(graph.dag_id(), run_date)
        .with_params(cfg.params.clone())
        .with_params(args.params.iter().cloned().collect());

    info!(
        dag = %graph.dag_id(),
        run_id = %ctx.run_id,
        ds = %ctx.ds(),
        roots = ?graph.roots(),
        "starting DAG run"
    );

    let (cancel, handle) = spawn_dag(graph, ctx)?;

    // Ctrl-C → cancel: running tasks finish, pending tasks are skipped.
    let ctrl_c = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received; cancelling run");
        if let Err(e) = cancel.cancel().await {
            debug!(error = %e, "run already finished when cancelling");
        }
    });

    let report = handle.await.map_err(Error::from)??;
    ctrl_c.abort();

    print!("{report}");
    Ok(report.status)
}

/// Dry-run output: tasks, rules, retry policy and execution order.
fn print_dry_run(cfg: &ConfigFile, graph: &Graph) -> Result<()> {
    println!("dagflow dry-run: {}", graph.dag_id());
    if let Some(ref description) = cfg.dag.description {
        println!("  {description}");
    }
    println!();

    println!("tasks ({}):", graph.len());
    for id in graph.tasks() {
        let Some(spec) = graph.task(id) else {
            continue;
        };
        println!("  - {id}");
        match cfg.task.get(id).and_then(|t| t.cmd.as_ref()) {
            Some(cmd) => println!("      cmd: {cmd}"),
            None => println!("      cmd: (none)"),
        }
        let upstream = graph.upstream_of(id);
        if !upstream.is_empty() {
            println!("      after: {:?}", upstream);
        }
        println!("      trigger_rule: {}", spec.trigger_rule);
        if spec.max_retries > 0 {
            println!(
                "      retries: {} (delay {:?})",
                spec.max_retries, spec.retry_delay
            );
        }
        if let Some(limit) = spec.timeout {
            println!("      timeout: {limit:?}");
        }
    }

    println!();
    println!("order: {}", graph.validate()?.join(" -> "));

    if !cfg.params.is_empty() {
        println!();
        println!("params:");
        for (key, value) in &cfg.params {
            println!("  {key} = {value}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
