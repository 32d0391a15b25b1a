use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use dagflow::dag::{ScheduledTask, TaskId};
use dagflow::engine::{RuntimeEvent, TaskOutcome, TaskReport};
use dagflow::errors::Result;
use dagflow::exec::ExecutorBackend;
use serde_json::Value;
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which tasks were dispatched, in order
/// - reports a scripted outcome for each one, in dispatch order, from a
///   background task (`Success(null)` unless [`FakeExecutor::fail`] was
///   called for it).
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    failures: HashMap<TaskId, String>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            failures: HashMap::new(),
        }
    }

    /// Script `task` to fail with `message`.
    pub fn fail(mut self, task: &str, message: &str) -> Self {
        self.failures.insert(task.to_string(), message.to_string());
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failures = self.failures.clone();

        Box::pin(async move {
            let mut reports = Vec::with_capacity(tasks.len());
            for t in tasks {
                let name = t.name().to_string();
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(name.clone());
                }

                let outcome = match failures.get(&name) {
                    Some(message) => TaskOutcome::Failed(message.clone()),
                    None => TaskOutcome::Success(Value::Null),
                };

                reports.push(TaskReport {
                    task: name,
                    attempts: 1,
                    outcome,
                });
            }

            // The runtime only drains the channel after this future returns,
            // so a large batch must not be sent inline.
            tokio::spawn(async move {
                for report in reports {
                    if tx.send(RuntimeEvent::TaskCompleted(report)).await.is_err() {
                        break;
                    }
                }
            });
            Ok(())
        })
    }
}
