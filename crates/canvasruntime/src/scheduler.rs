//! Deterministic execution ordering for a graph snapshot.

use canvascore::{Edge, GraphIndex, Node, NodeId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// Execution order plus the nodes that could not be placed in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub sequence: Vec<NodeId>,
    /// Nodes inside a cycle or only reachable through one, in node-list order.
    pub excluded: Vec<NodeId>,
}

impl Schedule {
    pub fn build(nodes: &[Node], edges: &[Edge]) -> Self {
        let sequence = schedule(nodes, edges);
        let placed: HashSet<&str> = sequence.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let excluded = nodes
            .iter()
            .map(|node| node.id.as_str())
            .filter(|id| !placed.contains(id) && seen.insert(*id))
            .map(str::to_string)
            .collect();
        Self { sequence, excluded }
    }

    pub fn is_complete(&self) -> bool {
        self.excluded.is_empty()
    }
}

/// Kahn's algorithm.
///
/// The ready queue is seeded in node-list order and successors are enqueued
/// in edge insertion order, so the result is stable for a given snapshot.
/// Edges naming unknown nodes are ignored. Nodes on a cycle never reach
/// in-degree zero and are left out without an error.
pub fn schedule(nodes: &[Node], edges: &[Edge]) -> Vec<NodeId> {
    let index = GraphIndex::new(nodes);

    let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(index.len());
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut order: Vec<&str> = Vec::with_capacity(index.len());
    for node in nodes {
        if !in_degree.contains_key(node.id.as_str()) {
            in_degree.insert(node.id.as_str(), 0);
            order.push(node.id.as_str());
        }
    }

    for edge in index.valid_edges(edges) {
        if let Some(degree) = in_degree.get_mut(edge.target.as_str()) {
            *degree += 1;
        }
        successors
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    let mut queue: VecDeque<&str> = order
        .iter()
        .copied()
        .filter(|id| in_degree.get(id).copied() == Some(0))
        .collect();

    let mut sequence = Vec::with_capacity(order.len());
    while let Some(id) = queue.pop_front() {
        sequence.push(id.to_string());
        for &next in successors.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    if sequence.len() < order.len() {
        tracing::debug!(
            scheduled = sequence.len(),
            total = order.len(),
            "Some nodes could not be scheduled"
        );
    }
    sequence
}

/// Node sets that form cycles (strongly connected components with more than
/// one member, or a node with an edge to itself). Members are listed in
/// node-list order.
pub fn find_cycles(nodes: &[Node], edges: &[Edge]) -> Vec<Vec<NodeId>> {
    let index = GraphIndex::new(nodes);
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut positions: HashMap<&str, (NodeIndex, usize)> = HashMap::new();

    for (position, node) in nodes.iter().enumerate() {
        if !positions.contains_key(node.id.as_str()) {
            let idx = graph.add_node(node.id.as_str());
            positions.insert(node.id.as_str(), (idx, position));
        }
    }

    let mut self_loops = HashSet::new();
    for edge in index.valid_edges(edges) {
        let (Some(&(from, _)), Some(&(to, _))) = (
            positions.get(edge.source.as_str()),
            positions.get(edge.target.as_str()),
        ) else {
            continue;
        };
        if from == to {
            self_loops.insert(from);
        }
        graph.add_edge(from, to, ());
    }

    let position_of = |id: &str| positions.get(id).map(|&(_, p)| p).unwrap_or(usize::MAX);

    let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| component.len() > 1 || self_loops.contains(&component[0]))
        .map(|component| {
            let mut members: Vec<&str> = component.iter().map(|&idx| graph[idx]).collect();
            members.sort_by_key(|id| position_of(*id));
            members.into_iter().map(str::to_string).collect()
        })
        .collect();
    cycles.sort_by_key(|members| position_of(members[0].as_str()));
    cycles
}
