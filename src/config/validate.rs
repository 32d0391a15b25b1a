use std::sync::LazyLock;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DagflowError, Result};
use crate::types::parse_duration;

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").expect("id regex is valid")
});

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DagflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.dag,
            raw.default,
            raw.params,
            raw.task,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_ids(cfg)?;
    validate_durations(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DagflowError::ConfigError(
            "config must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_ids(cfg: &RawConfigFile) -> Result<()> {
    if !ID_PATTERN.is_match(&cfg.dag.id) {
        return Err(DagflowError::ConfigError(format!(
            "[dag].id '{}' is not a valid identifier",
            cfg.dag.id
        )));
    }

    for name in cfg.task.keys() {
        if !ID_PATTERN.is_match(name) {
            return Err(DagflowError::ConfigError(format!(
                "task id '{}' is not a valid identifier (letters, digits, '_', '.', '-')",
                name
            )));
        }
    }
    Ok(())
}

fn validate_durations(cfg: &RawConfigFile) -> Result<()> {
    let check = |owner: &str, field: &str, value: Option<&str>| -> Result<()> {
        if let Some(v) = value {
            parse_duration(v).map_err(|e| {
                DagflowError::ConfigError(format!("{owner}: invalid `{field}` '{v}': {e}"))
            })?;
        }
        Ok(())
    };

    check("[default]", "retry_delay", cfg.default.retry_delay.as_deref())?;
    check("[default]", "timeout", cfg.default.timeout.as_deref())?;

    for (name, task) in cfg.task.iter() {
        let owner = format!("task '{name}'");
        check(&owner, "retry_delay", task.retry_delay.as_deref())?;
        check(&owner, "timeout", task.timeout.as_deref())?;
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(DagflowError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(DagflowError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task
    // For:
    //   [task.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(DagflowError::DagCycle(format!(
                "cycle detected in task DAG involving task '{}'",
                node
            )))
        }
    }
}
