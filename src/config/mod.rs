// src/config/mod.rs

//! Configuration loading and validation for dagflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like DAG correctness (`validate.rs`).
//! - Turn a validated config into a runnable [`Graph`](crate::dag::Graph)
//!   (`compile.rs`).

pub mod compile;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_and_validate};
pub use model::{ConfigFile, DagSection, DefaultSection, RawConfigFile, TaskConfig};
