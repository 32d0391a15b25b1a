// src/dag/graph.rs

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::dag::task::{TaskId, TaskSpec};
use crate::errors::{DagflowError, Result};

/// Internal node structure: the task definition plus immediate neighbours.
#[derive(Debug, Clone)]
struct DagNode {
    spec: Arc<TaskSpec>,
    /// Tasks that must be terminal before this one is considered.
    upstream: Vec<TaskId>,
    /// Tasks that list this one as upstream.
    downstream: Vec<TaskId>,
}

/// In-memory DAG of tasks keyed by task id.
///
/// Adjacency is kept in both directions so the scheduler can look up the
/// upstream set of a task and the downstream set of a finished task without
/// scanning every edge. Iteration order is by task id, which keeps
/// [`Graph::validate`] deterministic.
#[derive(Debug, Clone)]
pub struct Graph {
    dag_id: String,
    nodes: BTreeMap<TaskId, DagNode>,
}

impl Graph {
    pub fn new(dag_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            nodes: BTreeMap::new(),
        }
    }

    /// Start a fluent [`GraphBuilder`].
    pub fn builder(dag_id: impl Into<String>) -> GraphBuilder {
        GraphBuilder::new(dag_id)
    }

    /// Register a task. Fails if a task with the same id already exists.
    pub fn add_task(&mut self, spec: TaskSpec) -> Result<()> {
        if self.nodes.contains_key(&spec.id) {
            return Err(DagflowError::DuplicateTask(spec.id));
        }
        debug!(dag = %self.dag_id, task = %spec.id, "adding task");
        self.nodes.insert(
            spec.id.clone(),
            DagNode {
                spec: Arc::new(spec),
                upstream: Vec::new(),
                downstream: Vec::new(),
            },
        );
        Ok(())
    }

    /// Add the edge `upstream -> downstream`.
    ///
    /// Rejects unknown ids and any edge that would close a cycle (including a
    /// self-edge). Declaring an existing edge again is a no-op.
    pub fn add_edge(&mut self, upstream: &str, downstream: &str) -> Result<()> {
        self.ensure_known(upstream)?;
        self.ensure_known(downstream)?;

        if upstream == downstream || self.reaches(downstream, upstream) {
            return Err(DagflowError::DagCycle(format!(
                "edge '{upstream}' -> '{downstream}' would close a cycle"
            )));
        }

        self.insert_edge(upstream, downstream);
        Ok(())
    }

    /// One upstream task feeding many downstream tasks.
    pub fn fan_out<S: AsRef<str>>(&mut self, upstream: &str, downstream: &[S]) -> Result<()> {
        for down in downstream {
            self.add_edge(upstream, down.as_ref())?;
        }
        Ok(())
    }

    /// Many upstream tasks feeding one downstream (join) task.
    pub fn fan_in<S: AsRef<str>>(&mut self, upstream: &[S], downstream: &str) -> Result<()> {
        for up in upstream {
            self.add_edge(up.as_ref(), downstream)?;
        }
        Ok(())
    }

    /// Link the given tasks into a linear chain.
    pub fn chain<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<()> {
        for pair in ids.windows(2) {
            self.add_edge(pair[0].as_ref(), pair[1].as_ref())?;
        }
        Ok(())
    }

    /// Topologically sort the graph with Kahn's algorithm.
    ///
    /// Returns the task ids in a dependency-respecting order (ties broken by
    /// id) or [`DagflowError::DagCycle`] naming every task that could not be
    /// removed. Calling this repeatedly yields the same result.
    pub fn validate(&self) -> Result<Vec<TaskId>> {
        let mut indegree: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(id, node)| (id.as_str(), node.upstream.len()))
            .collect();

        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());

            let mut released = Vec::new();
            for down in self.downstream_of(id) {
                if let Some(deg) = indegree.get_mut(down.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        released.push(down.as_str());
                    }
                }
            }
            released.sort_unstable();
            queue.extend(released);
        }

        if order.len() < self.nodes.len() {
            let stuck: Vec<&str> = indegree
                .iter()
                .filter(|(_, deg)| **deg > 0)
                .map(|(id, _)| *id)
                .collect();
            return Err(DagflowError::DagCycle(format!(
                "tasks involved in a cycle: {}",
                stuck.join(", ")
            )));
        }

        debug!(dag = %self.dag_id, ?order, "graph validated");
        Ok(order)
    }

    pub fn dag_id(&self) -> &str {
        &self.dag_id
    }

    /// Return all task ids (sorted).
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn task(&self, id: &str) -> Option<&Arc<TaskSpec>> {
        self.nodes.get(id).map(|n| &n.spec)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate upstream tasks of `id`.
    pub fn upstream_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.upstream.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate downstream tasks of `id`.
    pub fn downstream_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.downstream.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks without upstream tasks.
    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.upstream.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    fn ensure_known(&self, id: &str) -> Result<()> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(DagflowError::UnknownTask(id.to_string()))
        }
    }

    /// Whether `to` is reachable from `from` by following downstream edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut visited: HashSet<&str> = HashSet::new();

        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.extend(self.downstream_of(id).iter().map(String::as_str));
        }

        false
    }

    /// Record the edge in both adjacency lists without any cycle check.
    fn insert_edge(&mut self, upstream: &str, downstream: &str) {
        if let Some(node) = self.nodes.get_mut(downstream) {
            if node.upstream.iter().any(|u| u == upstream) {
                return;
            }
            node.upstream.push(upstream.to_string());
        }
        if let Some(node) = self.nodes.get_mut(upstream) {
            node.downstream.push(downstream.to_string());
        }
    }
}

/// Fluent builder that collects task and edge declarations and checks them
/// all at once in [`GraphBuilder::build`].
///
/// Unlike [`Graph::add_edge`], edges are not checked for cycles one by one;
/// the finished graph goes through [`Graph::validate`] instead.
#[derive(Debug)]
pub struct GraphBuilder {
    dag_id: String,
    tasks: Vec<TaskSpec>,
    edges: Vec<(TaskId, TaskId)>,
}

impl GraphBuilder {
    pub fn new(dag_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            tasks: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.tasks.push(spec);
        self
    }

    pub fn edge(mut self, upstream: &str, downstream: &str) -> Self {
        self.edges.push((upstream.to_string(), downstream.to_string()));
        self
    }

    pub fn fan_out<S: AsRef<str>>(mut self, upstream: &str, downstream: &[S]) -> Self {
        for down in downstream {
            self.edges
                .push((upstream.to_string(), down.as_ref().to_string()));
        }
        self
    }

    pub fn fan_in<S: AsRef<str>>(mut self, upstream: &[S], downstream: &str) -> Self {
        for up in upstream {
            self.edges
                .push((up.as_ref().to_string(), downstream.to_string()));
        }
        self
    }

    pub fn chain<S: AsRef<str>>(mut self, ids: &[S]) -> Self {
        for pair in ids.windows(2) {
            self.edges
                .push((pair[0].as_ref().to_string(), pair[1].as_ref().to_string()));
        }
        self
    }

    /// Build and validate the graph.
    pub fn build(self) -> Result<Graph> {
        let mut graph = Graph::new(self.dag_id);

        for spec in self.tasks {
            graph.add_task(spec)?;
        }

        for (up, down) in &self.edges {
            graph.ensure_known(up)?;
            graph.ensure_known(down)?;
            graph.insert_edge(up, down);
        }

        graph.validate()?;
        Ok(graph)
    }
}
