// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually running task work functions and
//! reporting back to the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`executor`] runs one task with retry/backoff and builds its report.
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `TokioExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.
//! - [`command`] provides `ShellWork`, the work function behind
//!   `cmd = "..."` in TOML DAG declarations.

pub mod backend;
pub mod command;
pub mod executor;

pub use backend::{ExecutorBackend, TokioExecutorBackend};
pub use command::ShellWork;
pub use executor::Executor;
