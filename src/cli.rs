// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `dagflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagflow",
    version,
    about = "Run a DAG of shell tasks with retries and trigger rules.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the DAG declaration (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logical date of the run (`{{ ds }}`), YYYY-MM-DD. Defaults to today.
    #[arg(long, value_name = "DATE")]
    pub run_date: Option<NaiveDate>,

    /// Run parameter `key=value`; overrides `[params]`. Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the DAG, but don't execute any tasks.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
