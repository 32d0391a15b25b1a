// src/exec/command.rs

//! Shell-command work functions used by TOML-declared DAGs.

use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::context::TaskContext;
use crate::dag::{Work, WorkFuture};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("placeholder regex is valid")
});

/// Work function that runs a shell command.
///
/// - The command goes through `sh -c` (`cmd /C` on Windows).
/// - `{{ ds }}`, `{{ ds_nodash }}`, `{{ run_id }}`, `{{ dag_id }}`,
///   `{{ task_id }}`, `{{ attempt }}` and `{{ params.<name> }}` are
///   substituted before running; an unknown placeholder fails the attempt.
/// - A non-zero exit status fails the attempt.
/// - Trimmed stdout becomes the payload: JSON if it parses, else a string,
///   `null` when empty.
#[derive(Debug, Clone)]
pub struct ShellWork {
    cmd: String,
}

impl ShellWork {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

impl Work for ShellWork {
    fn call(&self, ctx: TaskContext) -> WorkFuture {
        let template = self.cmd.clone();
        Box::pin(async move { run_shell(&template, &ctx).await })
    }
}

/// Substitute `{{ ... }}` placeholders in `template`.
pub fn render_command(template: &str, ctx: &TaskContext) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&placeholder_value(key.as_str(), ctx)?);
        last = whole.end();
    }

    rendered.push_str(&template[last..]);
    Ok(rendered)
}

fn placeholder_value(key: &str, ctx: &TaskContext) -> Result<String> {
    let value = match key {
        "ds" => ctx.run.ds(),
        "ds_nodash" => ctx.run.run_date.format("%Y%m%d").to_string(),
        "run_id" => ctx.run.run_id.clone(),
        "dag_id" => ctx.run.dag_id.clone(),
        "task_id" => ctx.task_id.clone(),
        "attempt" => ctx.attempt.to_string(),
        other => match other.strip_prefix("params.") {
            Some(name) => ctx
                .param(name)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("unknown parameter '{name}' in command"))?,
            None => bail!("unknown placeholder '{{{{ {other} }}}}' in command"),
        },
    };
    Ok(value)
}

async fn run_shell(template: &str, ctx: &TaskContext) -> Result<Value> {
    let rendered = render_command(template, ctx)?;

    info!(
        task = %ctx.task_id,
        attempt = ctx.attempt,
        cmd = %rendered,
        "starting task process"
    );

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&rendered);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&rendered);
        c
    };

    cmd.env("DAGFLOW_DAG_ID", &ctx.run.dag_id)
        .env("DAGFLOW_RUN_ID", &ctx.run.run_id)
        .env("DAGFLOW_DS", ctx.run.ds())
        .env("DAGFLOW_TASK_ID", &ctx.task_id)
        .env("DAGFLOW_ATTEMPT", ctx.attempt.to_string());
    for (name, value) in &ctx.run.params {
        cmd.env(format!("DAGFLOW_PARAM_{}", name.to_uppercase()), value);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .with_context(|| format!("spawning process for task '{}'", ctx.task_id))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines() {
        debug!(task = %ctx.task_id, "stderr: {}", line);
    }

    let code = output.status.code().unwrap_or(-1);
    info!(
        task = %ctx.task_id,
        attempt = ctx.attempt,
        exit_code = code,
        success = output.status.success(),
        "task process exited"
    );

    if !output.status.success() {
        match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(last) => bail!("command exited with code {code}: {}", last.trim()),
            None => bail!("command exited with code {code}"),
        }
    }

    Ok(parse_payload(&String::from_utf8_lossy(&output.stdout)))
}

/// Interpret captured stdout as a task payload.
pub fn parse_payload(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}
