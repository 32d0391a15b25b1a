// tests/runtime_scenarios.rs

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use dagflow::context::TaskContext;
use dagflow::dag::{Graph, RunStatus, TaskSpec, TaskState};
use dagflow::engine::{run_dag, spawn_dag};
use dagflow::TriggerRule;
use dagflow_test_utils::builders::test_run_context;
use dagflow_test_utils::work::{fail_work, ok_with, recording_work, sleep_work, PanicOnCall};
use dagflow_test_utils::{init_tracing, with_timeout};
use serde_json::{json, Value};
use tokio::sync::Barrier;

type TestResult = Result<(), Box<dyn Error>>;

/// Join work that fails unless every listed upstream published a payload.
fn gate(upstream: &[&str]) -> impl dagflow::dag::Work + use<> {
    let upstream: Vec<String> = upstream.iter().map(|s| s.to_string()).collect();
    move |ctx: TaskContext| {
        let upstream = upstream.clone();
        async move {
            let missing: Vec<&str> = upstream
                .iter()
                .filter(|t| ctx.pull_return(t).is_none())
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(anyhow!("upstream produced nothing: {}", missing.join(", ")));
            }
            Ok::<_, anyhow::Error>(Value::Null)
        }
    }
}

/// `start → {l1, l2} → join (all_done) → {ok (all_success), fail_notice (one_failed)}`
fn scenario_graph(l2_fails: bool) -> Result<Graph, dagflow::DagflowError> {
    let l2 = if l2_fails {
        TaskSpec::new("l2", fail_work("source file missing")).with_retries(1)
    } else {
        TaskSpec::new("l2", ok_with(json!(20)))
    };

    Graph::builder("scenario")
        .task(TaskSpec::noop("start"))
        .task(TaskSpec::new("l1", ok_with(json!(10))))
        .task(l2)
        .task(TaskSpec::new("join", gate(&["l1", "l2"])).with_trigger_rule(TriggerRule::AllDone))
        .task(TaskSpec::noop("ok"))
        .task(TaskSpec::noop("fail_notice").with_trigger_rule(TriggerRule::OneFailed))
        .fan_out("start", &["l1", "l2"])
        .fan_in(&["l1", "l2"], "join")
        .fan_out("join", &["ok", "fail_notice"])
        .build()
}

#[tokio::test]
async fn happy_path_runs_success_branch() -> TestResult {
    init_tracing();

    let run = with_timeout(run_dag(scenario_graph(false)?, test_run_context("scenario"))).await?;

    assert_eq!(run.status, RunStatus::Success);
    assert!(!run.cancelled);
    assert_eq!(run.state_of("ok"), Some(TaskState::Success));
    assert_eq!(run.state_of("fail_notice"), Some(TaskState::Skipped));
    assert_eq!(
        run.tasks_in_state(TaskState::Success),
        vec!["join", "l1", "l2", "ok", "start"]
    );
    Ok(())
}

#[tokio::test]
async fn failed_load_runs_failure_branch() -> TestResult {
    init_tracing();

    let run = with_timeout(run_dag(scenario_graph(true)?, test_run_context("scenario"))).await?;

    assert_eq!(run.status, RunStatus::Failed);

    let l2 = run.record("l2").ok_or("missing l2")?;
    assert_eq!(l2.state, TaskState::Failed);
    assert_eq!(l2.attempts, 2);
    assert_eq!(l2.last_error.as_deref(), Some("source file missing"));

    // join still ran (all_done) and surfaced the missing input.
    let join = run.record("join").ok_or("missing join")?;
    assert_eq!(join.state, TaskState::Failed);
    assert_eq!(join.attempts, 1);

    assert_eq!(run.state_of("ok"), Some(TaskState::Skipped));
    assert_eq!(run.state_of("fail_notice"), Some(TaskState::Success));
    Ok(())
}

#[tokio::test]
async fn rules_only_look_at_immediate_upstream() -> TestResult {
    init_tracing();

    // A no-op join succeeds even though one of its inputs failed, so the
    // success branch runs and the failure branch is skipped.
    let graph = Graph::builder("immediate")
        .task(TaskSpec::new("l1", fail_work("broken")))
        .task(TaskSpec::noop("join").with_trigger_rule(TriggerRule::AllDone))
        .task(TaskSpec::noop("ok"))
        .task(TaskSpec::noop("fail_notice").with_trigger_rule(TriggerRule::OneFailed))
        .edge("l1", "join")
        .fan_out("join", &["ok", "fail_notice"])
        .build()?;

    let run = with_timeout(run_dag(graph, test_run_context("immediate"))).await?;

    assert_eq!(run.state_of("ok"), Some(TaskState::Success));
    assert_eq!(run.state_of("fail_notice"), Some(TaskState::Skipped));
    assert_eq!(run.status, RunStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn siblings_are_dispatched_concurrently() -> TestResult {
    init_tracing();

    // Each sibling blocks until all of them have started; a sequential
    // scheduler would never get past the first one.
    let siblings = ["a", "b", "c", "d"];
    let barrier = Arc::new(Barrier::new(siblings.len()));

    let mut builder = Graph::builder("concurrent").task(TaskSpec::noop("start"));
    for id in siblings {
        let barrier = Arc::clone(&barrier);
        builder = builder.task(TaskSpec::new(id, move |_ctx: TaskContext| {
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                Ok::<_, anyhow::Error>(Value::Null)
            }
        }));
    }
    let graph = builder.fan_out("start", &siblings).build()?;

    let run = with_timeout(run_dag(graph, test_run_context("concurrent"))).await?;

    assert_eq!(run.status, RunStatus::Success);
    Ok(())
}

#[tokio::test]
async fn downstream_never_starts_before_upstream_finishes() -> TestResult {
    init_tracing();

    let log = Arc::new(Mutex::new(Vec::new()));
    let graph = Graph::builder("order")
        .task(TaskSpec::new("slow", {
            let log = Arc::clone(&log);
            move |ctx: TaskContext| {
                let log = Arc::clone(&log);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    log.lock().unwrap().push(ctx.task_id.clone());
                    Ok::<_, anyhow::Error>(Value::Null)
                }
            }
        }))
        .task(TaskSpec::new("fast", recording_work(Arc::clone(&log))))
        .task(TaskSpec::new("after_both", recording_work(Arc::clone(&log))))
        .fan_in(&["slow", "fast"], "after_both")
        .build()?;

    with_timeout(run_dag(graph, test_run_context("order"))).await?;

    let order = log.lock().unwrap().clone();
    assert_eq!(order, vec!["fast", "slow", "after_both"]);
    Ok(())
}

#[tokio::test]
async fn payloads_flow_to_descendants() -> TestResult {
    init_tracing();

    let graph = Graph::builder("values")
        .task(TaskSpec::new("producer", ok_with(json!(21))))
        .task(TaskSpec::new("consumer", |ctx: TaskContext| async move {
            let input = ctx
                .pull_return("producer")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| anyhow!("producer published nothing"))?;
            ctx.push("note", json!("doubled"));
            Ok::<_, anyhow::Error>(json!(input * 2))
        }))
        .edge("producer", "consumer")
        .build()?;

    let ctx = test_run_context("values");
    let store = ctx.store.clone();
    let run = with_timeout(run_dag(graph, ctx)).await?;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(
        run.record("consumer").and_then(|r| r.payload.clone()),
        Some(json!(42))
    );
    assert_eq!(store.pull("consumer", "note"), Some(json!("doubled")));
    assert_eq!(store.pull_return("consumer"), Some(json!(42)));
    Ok(())
}

#[tokio::test]
async fn cancel_skips_pending_and_lets_running_finish() -> TestResult {
    init_tracing();

    let graph = Graph::builder("cancel")
        .task(TaskSpec::new("long", sleep_work(Duration::from_millis(200))))
        .task(TaskSpec::noop("next"))
        .task(TaskSpec::noop("last").with_trigger_rule(TriggerRule::AllDone))
        .chain(&["long", "next", "last"])
        .build()?;

    let (cancel, handle) = spawn_dag(graph, test_run_context("cancel"))?;
    cancel.cancel().await?;

    let run = with_timeout(handle).await??;

    assert!(run.cancelled);
    assert_eq!(run.state_of("long"), Some(TaskState::Success));
    assert_eq!(run.state_of("next"), Some(TaskState::Skipped));
    assert_eq!(run.state_of("last"), Some(TaskState::Skipped));
    assert_eq!(run.status, RunStatus::Success);
    assert!(run.is_complete());
    Ok(())
}

#[tokio::test]
async fn report_lists_every_task() -> TestResult {
    init_tracing();

    let run = with_timeout(run_dag(scenario_graph(true)?, test_run_context("scenario"))).await?;
    let text = run.to_string();

    assert!(text.starts_with("dag scenario run test__run: failed"));
    for id in ["start", "l1", "l2", "join", "ok", "fail_notice"] {
        assert!(text.contains(id), "report is missing {id}:\n{text}");
    }
    assert!(text.contains("error: source file missing"));
    Ok(())
}

#[tokio::test]
async fn panic_while_starting_work_fails_the_task_and_the_run_completes() -> TestResult {
    init_tracing();

    let graph = Graph::builder("panics")
        .task(TaskSpec::new("a", PanicOnCall))
        .task(TaskSpec::noop("b"))
        .edge("a", "b")
        .build()?;

    let run = with_timeout(run_dag(graph, test_run_context("panics"))).await?;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.state_of("a"), Some(TaskState::Failed));
    assert_eq!(run.state_of("b"), Some(TaskState::Skipped));
    Ok(())
}
