// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::dag::TaskId;

#[derive(Error, Debug)]
pub enum DagflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(TaskId),

    #[error("Unknown task id: {0}")]
    UnknownTask(TaskId),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Task '{task}' failed after {attempts} attempt(s): {message}")]
    TaskExecution {
        task: TaskId,
        attempts: u32,
        message: String,
    },

    #[error("DAG run stalled: {0}")]
    StalledRun(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagflowError>;
