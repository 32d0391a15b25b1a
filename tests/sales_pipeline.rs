// tests/sales_pipeline.rs
//
// The load → query → check → notify pipeline, wired with in-memory
// collaborators.

use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use dagflow::collab::{
    load_table_work, notify_work, query_work, row_count_check, BulkLoader, LogNotifier, Notifier,
    QueryRunner, ERROR_MESSAGE_KEY, ROW_COUNT_KEY,
};
use dagflow::context::RunContext;
use dagflow::dag::{Graph, RunStatus, TaskSpec, TaskState};
use dagflow::engine::run_dag;
use dagflow::TriggerRule;
use dagflow_test_utils::builders::test_run_context;
use dagflow_test_utils::{init_tracing, with_timeout};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

const TABLES: [&str; 4] = ["customer", "product", "orders", "order_items"];

#[derive(Default)]
struct FakeLoader {
    /// Remaining failures per table.
    failures: Mutex<HashMap<String, u32>>,
    loads: Mutex<Vec<String>>,
}

impl FakeLoader {
    fn failing(table: &str, times: u32) -> Self {
        let loader = Self::default();
        loader
            .failures
            .lock()
            .unwrap()
            .insert(table.to_string(), times);
        loader
    }
}

impl BulkLoader for FakeLoader {
    fn load_table(&self, source: &Path, table: &str) -> Result<u64> {
        self.loads.lock().unwrap().push(table.to_string());
        if let Some(left) = self.failures.lock().unwrap().get_mut(table) {
            if *left > 0 {
                *left -= 1;
                return Err(anyhow!("cannot read {}", source.display()));
            }
        }
        Ok(100)
    }
}

struct FakeRunner {
    rows: HashMap<String, u64>,
}

impl QueryRunner for FakeRunner {
    fn run_query(&self, _sql: &str, artifact: &str) -> Result<u64> {
        Ok(self.rows.get(artifact).copied().unwrap_or(0))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, channel: &str, subject: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

struct Collaborators {
    loader: Arc<FakeLoader>,
    runner: Arc<FakeRunner>,
    notifier: Arc<RecordingNotifier>,
}

impl Collaborators {
    fn new(loader: FakeLoader, wealth_rows: u64) -> Self {
        let rows = HashMap::from([
            ("top_customers.csv".to_string(), 3),
            ("wealth_segments.csv".to_string(), wealth_rows),
        ]);
        Self {
            loader: Arc::new(loader),
            runner: Arc::new(FakeRunner { rows }),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }
}

fn sales_graph(c: &Collaborators, ctx: &RunContext) -> Result<Graph, dagflow::DagflowError> {
    let loader: Arc<dyn BulkLoader> = c.loader.clone();
    let runner: Arc<dyn QueryRunner> = c.runner.clone();
    let notifier: Arc<dyn Notifier> = c.notifier.clone();

    let loads: Vec<String> = TABLES.iter().map(|t| format!("load_{t}")).collect();
    let queries = ["query_top_customers", "query_wealth_segments"];

    let mut builder = Graph::builder("sales_analysis").task(TaskSpec::noop("start"));
    for (task, table) in loads.iter().zip(TABLES) {
        builder = builder.task(
            TaskSpec::new(
                task.as_str(),
                load_table_work(Arc::clone(&loader), format!("/data/{table}.csv"), table),
            )
            .with_retries(1),
        );
    }

    builder
        .task(TaskSpec::noop("join_loads"))
        .task(TaskSpec::new(
            "query_top_customers",
            query_work(Arc::clone(&runner), "SELECT ... LIMIT 3", "top_customers.csv"),
        ))
        .task(TaskSpec::new(
            "query_wealth_segments",
            query_work(Arc::clone(&runner), "SELECT ... GROUP BY segment", "wealth_segments.csv"),
        ))
        .task(TaskSpec::noop("join_queries"))
        .task(TaskSpec::new(
            "check_results",
            row_count_check(vec![
                ("query_top_customers".into(), "top_customers.csv".into()),
                ("query_wealth_segments".into(), "wealth_segments.csv".into()),
            ]),
        ))
        .task(
            TaskSpec::new(
                "send_failure_email",
                notify_work(
                    Arc::clone(&notifier),
                    "ops@example.com",
                    "Sales analysis failed",
                    format!("Run for {} failed.", ctx.ds()),
                    Some("check_results".into()),
                ),
            )
            .with_trigger_rule(TriggerRule::OneFailed),
        )
        .task(
            TaskSpec::new(
                "print_failure",
                notify_work(
                    Arc::new(LogNotifier),
                    "log",
                    "Sales analysis failed",
                    "See task logs.",
                    Some("check_results".into()),
                ),
            )
            .with_trigger_rule(TriggerRule::OneFailed),
        )
        .task(TaskSpec::noop("print_success"))
        .fan_out("start", &loads)
        .fan_in(&loads, "join_loads")
        .fan_out("join_loads", &queries)
        .fan_in(&queries, "join_queries")
        .edge("join_queries", "check_results")
        .fan_out(
            "check_results",
            &["print_success", "send_failure_email", "print_failure"],
        )
        .build()
}

#[tokio::test]
async fn all_reports_filled_runs_success_branch() -> TestResult {
    init_tracing();

    let collab = Collaborators::new(FakeLoader::default(), 5);
    let ctx = test_run_context("sales_analysis");
    let store = ctx.store.clone();
    let run = with_timeout(run_dag(sales_graph(&collab, &ctx)?, ctx)).await?;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.state_of("print_success"), Some(TaskState::Success));
    assert_eq!(run.state_of("send_failure_email"), Some(TaskState::Skipped));
    assert_eq!(run.state_of("print_failure"), Some(TaskState::Skipped));
    assert!(collab.notifier.sent.lock().unwrap().is_empty());

    assert_eq!(store.pull("load_orders", ROW_COUNT_KEY), Some(json!(100)));
    assert_eq!(
        run.record("check_results").and_then(|r| r.payload.clone()),
        Some(json!({ "top_customers.csv": 3, "wealth_segments.csv": 5 }))
    );
    Ok(())
}

#[tokio::test]
async fn empty_report_fails_check_and_notifies() -> TestResult {
    init_tracing();

    let collab = Collaborators::new(FakeLoader::default(), 0);
    let ctx = test_run_context("sales_analysis");
    let store = ctx.store.clone();
    let run = with_timeout(run_dag(sales_graph(&collab, &ctx)?, ctx)).await?;

    assert_eq!(run.status, RunStatus::Failed);

    let check = run.record("check_results").ok_or("missing check_results")?;
    assert_eq!(check.state, TaskState::Failed);
    assert_eq!(
        check.last_error.as_deref(),
        Some("queries returned 0 rows: wealth_segments.csv")
    );
    assert_eq!(
        store.pull("check_results", ERROR_MESSAGE_KEY),
        Some(json!("queries returned 0 rows: wealth_segments.csv"))
    );

    assert_eq!(run.state_of("print_success"), Some(TaskState::Skipped));
    assert_eq!(run.state_of("send_failure_email"), Some(TaskState::Success));
    assert_eq!(run.state_of("print_failure"), Some(TaskState::Success));

    let sent = collab.notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let (channel, subject, body) = &sent[0];
    assert_eq!(channel, "ops@example.com");
    assert_eq!(subject, "Sales analysis failed");
    assert_eq!(
        body,
        "Run for 2024-03-15 failed.\nReason: queries returned 0 rows: wealth_segments.csv"
    );
    Ok(())
}

#[tokio::test]
async fn transient_load_failure_is_retried() -> TestResult {
    init_tracing();

    let collab = Collaborators::new(FakeLoader::failing("order_items", 1), 5);
    let ctx = test_run_context("sales_analysis");
    let run = with_timeout(run_dag(sales_graph(&collab, &ctx)?, ctx)).await?;

    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(run.record("load_order_items").map(|r| r.attempts), Some(2));
    assert_eq!(run.record("load_customer").map(|r| r.attempts), Some(1));

    let loads = collab.loader.loads.lock().unwrap().clone();
    assert_eq!(loads.iter().filter(|t| *t == "order_items").count(), 2);
    Ok(())
}

#[tokio::test]
async fn permanent_load_failure_skips_everything_below_the_join() -> TestResult {
    init_tracing();

    let collab = Collaborators::new(FakeLoader::failing("product", 5), 5);
    let ctx = test_run_context("sales_analysis");
    let run = with_timeout(run_dag(sales_graph(&collab, &ctx)?, ctx)).await?;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.tasks_in_state(TaskState::Failed), vec!["load_product"]);

    // The failure notices hang off check_results, which never ran, so they
    // are skipped too.
    for task in [
        "join_loads",
        "query_top_customers",
        "check_results",
        "send_failure_email",
        "print_failure",
        "print_success",
    ] {
        assert_eq!(run.state_of(task), Some(TaskState::Skipped), "{task}");
    }
    Ok(())
}
