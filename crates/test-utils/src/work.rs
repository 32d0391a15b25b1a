#![allow(dead_code)]

//! Canned work functions for tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use dagflow::context::TaskContext;
use dagflow::dag::{Work, WorkFuture};
use serde_json::Value;

/// Succeeds with `null`.
pub fn ok_work() -> impl Work {
    ok_with(Value::Null)
}

/// Succeeds with `value`.
pub fn ok_with(value: Value) -> impl Work {
    move |_ctx: TaskContext| {
        let value = value.clone();
        async move { Ok::<_, anyhow::Error>(value) }
    }
}

/// Always fails with `message`.
pub fn fail_work(message: &str) -> impl Work + use<> {
    let message = message.to_string();
    move |_ctx: TaskContext| {
        let message = message.clone();
        async move { Err::<Value, _>(anyhow!(message)) }
    }
}

/// Counts every call in `calls` and succeeds.
pub fn counting_work(calls: Arc<AtomicU32>) -> impl Work {
    move |_ctx: TaskContext| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(Value::Null)
        }
    }
}

/// Fails the first `fail_times` calls, then succeeds with the attempt number.
pub fn flaky_work(fail_times: u32, calls: Arc<AtomicU32>) -> impl Work {
    move |ctx: TaskContext| {
        let calls = Arc::clone(&calls);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= fail_times {
                return Err(anyhow!("transient failure #{n}"));
            }
            Ok::<_, anyhow::Error>(Value::from(ctx.attempt))
        }
    }
}

/// Sleeps for `delay`, then succeeds.
pub fn sleep_work(delay: Duration) -> impl Work {
    move |_ctx: TaskContext| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, anyhow::Error>(Value::Null)
    }
}

/// Appends the task id to `log` when it runs, then succeeds.
pub fn recording_work(log: Arc<Mutex<Vec<String>>>) -> impl Work {
    move |ctx: TaskContext| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(ctx.task_id.clone());
            Ok::<_, anyhow::Error>(Value::Null)
        }
    }
}

/// Panics when called.
pub fn panic_work() -> impl Work {
    |_ctx: TaskContext| explode()
}

async fn explode() -> anyhow::Result<Value> {
    panic!("work exploded")
}

/// Panics inside `call`, before any future exists.
#[derive(Debug, Clone, Copy)]
pub struct PanicOnCall;

impl Work for PanicOnCall {
    fn call(&self, _ctx: TaskContext) -> WorkFuture {
        panic!("work refused to start")
    }
}
