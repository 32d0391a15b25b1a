// tests/runtime_fake_executor.rs

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use dagflow::config::ConfigFile;
use dagflow::dag::{Graph, RunStatus, ScheduledTask, Scheduler, TaskSpec, TaskState};
use dagflow::engine::{CoreRuntime, Runtime, RuntimeEvent};
use dagflow::exec::ExecutorBackend;
use dagflow::{DagflowError, TriggerRule};
use dagflow_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use dagflow_test_utils::fake_executor::FakeExecutor;
use dagflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

/// `extract -> transform -> load`, plus `alert` (one_failed) after `load`.
fn pipeline_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_dag_id("pipeline")
        .with_task("extract", TaskConfigBuilder::new("echo extract").build())
        .with_task(
            "transform",
            TaskConfigBuilder::new("echo transform").after("extract").build(),
        )
        .with_task("load", TaskConfigBuilder::new("echo load").after("transform").build())
        .with_task(
            "alert",
            TaskConfigBuilder::noop()
                .after("load")
                .trigger_rule(TriggerRule::OneFailed)
                .build(),
        )
        .build()
}

#[tokio::test]
async fn runtime_with_fake_executor_runs_chain_in_order() -> TestResult {
    init_tracing();

    let cfg = pipeline_config();
    let scheduler = Scheduler::new(cfg.build_graph()?, "fake-run")?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    let runtime = Runtime::new(CoreRuntime::new(scheduler), rt_rx, executor);

    // Enforce an upper bound on how long this test may run.
    let run = match timeout(Duration::from_secs(3), runtime.run()).await {
        Ok(res) => res?,
        Err(_) => panic!("runtime did not finish within 3 seconds"),
    };

    let tasks_run = executed.lock().unwrap().clone();
    assert_eq!(tasks_run, vec!["extract", "transform", "load"]);

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.state_of("alert"), Some(TaskState::Skipped));
    Ok(())
}

#[tokio::test]
async fn scripted_failure_skips_chain_and_runs_alert() -> TestResult {
    init_tracing();

    let cfg = pipeline_config();
    let scheduler = Scheduler::new(cfg.build_graph()?, "fake-run")?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor =
        FakeExecutor::new(rt_tx.clone(), executed.clone()).fail("transform", "bad schema");

    let runtime = Runtime::new(CoreRuntime::new(scheduler), rt_rx, executor);
    let run = timeout(Duration::from_secs(3), runtime.run()).await??;

    // transform failed, so load is skipped and alert sees only a skip.
    let tasks_run = executed.lock().unwrap().clone();
    assert_eq!(tasks_run, vec!["extract", "transform"]);

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.state_of("load"), Some(TaskState::Skipped));
    assert_eq!(run.state_of("alert"), Some(TaskState::Skipped));
    assert_eq!(
        run.record("transform").and_then(|r| r.last_error.clone()),
        Some("bad schema".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn cancel_event_queued_before_run_skips_downstream() -> TestResult {
    init_tracing();

    let cfg = pipeline_config();
    let scheduler = Scheduler::new(cfg.build_graph()?, "fake-run")?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    // Queued ahead of extract's completion report.
    rt_tx.send(RuntimeEvent::CancelRequested).await?;

    let runtime = Runtime::new(CoreRuntime::new(scheduler), rt_rx, executor);
    let run = timeout(Duration::from_secs(3), runtime.run()).await??;

    assert_eq!(executed.lock().unwrap().clone(), vec!["extract"]);
    assert!(run.cancelled);
    assert_eq!(run.state_of("extract"), Some(TaskState::Success));
    assert_eq!(run.tasks_in_state(TaskState::Skipped), vec!["alert", "load", "transform"]);
    Ok(())
}

#[tokio::test]
async fn wide_dispatch_larger_than_channel_completes() -> TestResult {
    init_tracing();

    let leaves: Vec<String> = (0..100).map(|i| format!("leaf_{i:03}")).collect();
    let mut builder = Graph::builder("wide").task(TaskSpec::noop("done"));
    for leaf in &leaves {
        builder = builder.task(TaskSpec::noop(leaf.as_str()));
    }
    let graph = builder.fan_in(&leaves, "done").build()?;
    let scheduler = Scheduler::new(graph, "wide-run")?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    let runtime = Runtime::new(CoreRuntime::new(scheduler), rt_rx, executor);
    let run = timeout(Duration::from_secs(3), runtime.run()).await??;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(executed.lock().unwrap().len(), 101);
    assert_eq!(run.state_of("done"), Some(TaskState::Success));
    Ok(())
}

/// Accepts tasks and never reports them.
struct SilentExecutor {
    dropped: Arc<Mutex<Vec<String>>>,
}

impl ExecutorBackend for SilentExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = dagflow::errors::Result<()>> + Send + '_>> {
        let dropped = Arc::clone(&self.dropped);
        Box::pin(async move {
            let mut guard = dropped.lock().unwrap();
            guard.extend(tasks.iter().map(|t| t.name().to_string()));
            Ok(())
        })
    }
}

#[tokio::test]
async fn lost_reports_with_closed_channel_stall_the_run() -> TestResult {
    init_tracing();

    let cfg = pipeline_config();
    let scheduler = Scheduler::new(cfg.build_graph()?, "silent-run")?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    drop(rt_tx);

    let dropped = Arc::new(Mutex::new(Vec::new()));
    let executor = SilentExecutor {
        dropped: Arc::clone(&dropped),
    };
    let runtime = Runtime::new(CoreRuntime::new(scheduler), rt_rx, executor);

    let err = match timeout(Duration::from_secs(3), runtime.run()).await? {
        Ok(run) => panic!("expected StalledRun, got a finished run: {run}"),
        Err(err) => err,
    };

    match err {
        DagflowError::StalledRun(msg) => assert!(msg.contains("channel closed"), "{msg}"),
        other => panic!("expected StalledRun, got {other:?}"),
    }
    assert_eq!(*dropped.lock().unwrap(), vec!["extract"]);
    Ok(())
}
