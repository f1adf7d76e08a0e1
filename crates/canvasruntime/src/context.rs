//! Per-run lookup tables and the context injected into each node.

use canvascore::{ExecutionContext, Node, NodeId, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Label → node id, built once per run.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    by_label: HashMap<String, NodeId>,
}

impl LabelIndex {
    /// When two nodes share a label the first one in node-list order wins.
    pub fn build(nodes: &[Node]) -> Self {
        let mut by_label: HashMap<String, NodeId> = HashMap::new();
        for node in nodes {
            let Some(label) = node.label() else {
                continue;
            };
            match by_label.get(label) {
                Some(existing) if existing != &node.id => {
                    tracing::warn!(
                        label,
                        kept = %existing,
                        ignored = %node.id,
                        "Duplicate node label; references resolve to the first node"
                    );
                }
                Some(_) => {}
                None => {
                    by_label.insert(label.to_string(), node.id.clone());
                }
            }
        }
        Self { by_label }
    }

    pub fn resolve(&self, label: &str) -> Option<&NodeId> {
        self.by_label.get(label)
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

/// Results of the current run, recorded in execution order.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    results: HashMap<NodeId, Value>,
    order: Vec<NodeId>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node_id: impl Into<NodeId>, result: Value) {
        let node_id = node_id.into();
        if self.results.insert(node_id.clone(), result).is_none() {
            self.order.push(node_id);
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&Value> {
        self.results.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.results.contains_key(node_id)
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Results in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Value)> {
        self.order
            .iter()
            .filter_map(|id| self.results.get(id).map(|result| (id, result)))
    }

    pub fn to_map(&self) -> BTreeMap<NodeId, Value> {
        self.iter()
            .map(|(id, result)| (id.clone(), result.clone()))
            .collect()
    }
}

/// A referenced label that could not be injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedDependency {
    /// No node carries this label.
    UnknownLabel(String),
    /// The labelled node has not produced a result (yet).
    NotComputed { label: String, node_id: NodeId },
}

impl UnresolvedDependency {
    pub fn label(&self) -> &str {
        match self {
            UnresolvedDependency::UnknownLabel(label)
            | UnresolvedDependency::NotComputed { label, .. } => label,
        }
    }
}

impl fmt::Display for UnresolvedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedDependency::UnknownLabel(label) => {
                write!(f, "no node is labelled '{}'", label)
            }
            UnresolvedDependency::NotComputed { label, node_id } => write!(
                f,
                "node '{}' (label '{}') has no result yet",
                node_id, label
            ),
        }
    }
}

/// Assemble `{label: {data: result}}` for every referenced label that
/// resolves to a computed result. Everything else is omitted and reported.
pub fn build_context(
    labels: &BTreeSet<String>,
    index: &LabelIndex,
    results: &ResultStore,
) -> (ExecutionContext, Vec<UnresolvedDependency>) {
    let mut context = ExecutionContext::new();
    let mut unresolved = Vec::new();

    for label in labels {
        let Some(node_id) = index.resolve(label) else {
            unresolved.push(UnresolvedDependency::UnknownLabel(label.clone()));
            continue;
        };
        match results.get(node_id) {
            Some(result) => context.insert(label.clone(), result.clone()),
            None => unresolved.push(UnresolvedDependency::NotComputed {
                label: label.clone(),
                node_id: node_id.clone(),
            }),
        }
    }

    for missing in &unresolved {
        tracing::warn!("Unresolved dependency: {}", missing);
    }
    (context, unresolved)
}
