use super::executor::Executor;
use super::message::TypeTag;
use crate::error::{WorkflowError, WorkflowResult};
use crate::types::ExecutorId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Topo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Start executor and edges of a built workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub start: ExecutorId,
    pub edges: Vec<(ExecutorId, ExecutorId)>,
}

/// Fluent builder for a [`Workflow`]
///
/// Registration problems are collected while building and reported by
/// [`WorkflowBuilder::build`], which can be called any number of times.
#[derive(Default, Clone)]
pub struct WorkflowBuilder {
    name: Option<String>,
    description: Option<String>,
    executors: Vec<Executor>,
    edges: Vec<(ExecutorId, ExecutorId)>,
    start: Option<ExecutorId>,
    errors: Vec<WorkflowError>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Register an executor without connecting it
    pub fn add_executor(mut self, executor: &Executor) -> Self {
        self.register(executor);
        self
    }

    /// Designate the start executor; allowed exactly once
    pub fn set_start_executor(mut self, executor: &Executor) -> Self {
        self.register(executor);
        match &self.start {
            Some(first) => self.errors.push(WorkflowError::StartExecutorAlreadySet {
                first: first.clone(),
                second: executor.id().clone(),
            }),
            None => self.start = Some(executor.id().clone()),
        }
        self
    }

    /// Connect two executors, registering both
    pub fn add_edge(mut self, source: &Executor, target: &Executor) -> Self {
        self.register(source);
        self.register(target);
        self.edges.push((source.id().clone(), target.id().clone()));
        self
    }

    /// Connect two executors by id; both must be registered by build time
    pub fn add_edge_by_id(
        mut self,
        source: impl Into<ExecutorId>,
        target: impl Into<ExecutorId>,
    ) -> Self {
        self.edges.push((source.into(), target.into()));
        self
    }

    /// Validate the configuration and produce an immutable workflow
    pub fn build(&self) -> WorkflowResult<Workflow> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone());
        }
        let start = self
            .start
            .clone()
            .ok_or(WorkflowError::MissingStartExecutor)?;

        let mut graph: DiGraph<ExecutorId, ()> = DiGraph::new();
        let mut indices: HashMap<ExecutorId, NodeIndex> = HashMap::new();
        let mut executors: HashMap<ExecutorId, Executor> = HashMap::new();

        for executor in &self.executors {
            executor.validate()?;
            let node = graph.add_node(executor.id().clone());
            indices.insert(executor.id().clone(), node);
            executors.insert(executor.id().clone(), executor.clone());
        }

        // Edges, deduplicated, in insertion order
        let mut edges: Vec<(ExecutorId, ExecutorId)> = Vec::new();
        for (source, target) in &self.edges {
            for endpoint in [source, target] {
                if !indices.contains_key(endpoint) {
                    return Err(WorkflowError::DanglingEdge {
                        source_id: source.clone(),
                        target: target.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
            if edges.iter().any(|(s, t)| s == source && t == target) {
                tracing::debug!("Ignoring duplicate edge {} -> {}", source, target);
                continue;
            }

            check_compatible(&executors[source], &executors[target])?;
            graph.add_edge(indices[source], indices[target], ());
            edges.push((source.clone(), target.clone()));
        }

        // Verify the graph is acyclic
        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(WorkflowError::CycleDetected);
        }

        let mut successors: HashMap<ExecutorId, Vec<ExecutorId>> = HashMap::new();
        for (source, target) in &edges {
            successors
                .entry(source.clone())
                .or_default()
                .push(target.clone());
        }

        let mut reachable = 0;
        let mut bfs = Bfs::new(&graph, indices[&start]);
        while bfs.next(&graph).is_some() {
            reachable += 1;
        }
        if reachable < graph.node_count() {
            tracing::warn!(
                "{} executor(s) are not reachable from start executor {}",
                graph.node_count() - reachable,
                start
            );
        }

        Ok(Workflow {
            inner: Arc::new(WorkflowInner {
                name: self.name.clone(),
                description: self.description.clone(),
                start,
                executors,
                successors: successors
                    .into_iter()
                    .map(|(id, targets)| (id, targets.into()))
                    .collect(),
                edges,
                graph,
            }),
        })
    }

    fn register(&mut self, executor: &Executor) {
        match self.executors.iter().find(|e| e.id() == executor.id()) {
            Some(existing) if existing.same_as(executor) => {}
            Some(_) => self
                .errors
                .push(WorkflowError::DuplicateExecutorId(executor.id().clone())),
            None => self.executors.push(executor.clone()),
        }
    }
}

fn check_compatible(source: &Executor, target: &Executor) -> WorkflowResult<()> {
    let Some(sent) = source.sent_types() else {
        return Ok(());
    };
    if sent.iter().any(|tag| target.accepts(tag)) {
        return Ok(());
    }
    Err(WorkflowError::IncompatibleEdge {
        source_id: source.id().clone(),
        target: target.id().clone(),
        sent: sent
            .iter()
            .map(TypeTag::name)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

struct WorkflowInner {
    name: Option<String>,
    description: Option<String>,
    start: ExecutorId,
    executors: HashMap<ExecutorId, Executor>,
    successors: HashMap<ExecutorId, Arc<[ExecutorId]>>,
    edges: Vec<(ExecutorId, ExecutorId)>,
    graph: DiGraph<ExecutorId, ()>,
}

/// An immutable, validated graph of executors
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<WorkflowInner>,
}

impl Workflow {
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    pub fn start_executor(&self) -> &ExecutorId {
        &self.inner.start
    }

    pub fn executor(&self, id: &ExecutorId) -> Option<&Executor> {
        self.inner.executors.get(id)
    }

    /// Executor ids, sorted
    pub fn executor_ids(&self) -> Vec<ExecutorId> {
        let mut ids: Vec<ExecutorId> = self.inner.executors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Direct successors of `id`, in edge insertion order
    pub fn successors(&self, id: &ExecutorId) -> Arc<[ExecutorId]> {
        self.inner
            .successors
            .get(id)
            .cloned()
            .unwrap_or_else(|| Vec::new().into())
    }

    pub fn topology(&self) -> Topology {
        Topology {
            start: self.inner.start.clone(),
            edges: self.inner.edges.clone(),
        }
    }

    /// Executors in topological order (predecessors first)
    pub fn topological_order(&self) -> Vec<ExecutorId> {
        let graph = &self.inner.graph;
        let mut topo = Topo::new(graph);
        let mut order = Vec::with_capacity(graph.node_count());

        while let Some(node) = topo.next(graph) {
            order.push(graph[node].clone());
        }

        order
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.inner.name)
            .field("start", &self.inner.start)
            .field("edges", &self.inner.edges)
            .finish()
    }
}
