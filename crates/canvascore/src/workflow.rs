use crate::{ExecutionError, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type NodeId = String;

/// Key in a node's data holding its human-readable label.
pub const LABEL_KEY: &str = "label";

/// Key in a node's data holding its logic body.
pub const CODE_KEY: &str = "code";

/// A graph snapshot handed over by the editor.
///
/// Extra fields produced by the canvas (positions, viewport, selection) are
/// ignored on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            name: None,
            nodes,
            edges,
        }
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn connect(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) {
        self.edges.push(Edge::new(source, target));
    }

    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn index(&self) -> GraphIndex<'_> {
        GraphIndex::new(&self.nodes)
    }
}

/// A unit of work in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_label(self, label: impl Into<String>) -> Self {
        self.with_data(LABEL_KEY, label.into())
    }

    /// Human-readable label, if the editor set one.
    pub fn label(&self) -> Option<&str> {
        self.data.get(LABEL_KEY).and_then(Value::as_str)
    }

    /// Logic body, for node types that carry one.
    pub fn code(&self) -> Option<&str> {
        self.data.get(CODE_KEY).and_then(Value::as_str)
    }

    /// Label when present, id otherwise. Used in log lines.
    pub fn display_name(&self) -> &str {
        self.label().unwrap_or(&self.id)
    }

    /// Deserialize the node's data into a typed per-executor configuration.
    pub fn config<T: DeserializeOwned>(&self) -> Result<T, ExecutionError> {
        let data = serde_json::Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        );
        serde_json::from_value(data).map_err(|e| {
            ExecutionError::Configuration(format!(
                "Invalid configuration for {} node '{}': {}",
                self.node_type, self.id, e
            ))
        })
    }
}

/// Directed dependency: `target` runs no earlier than `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Id-keyed view over a node list.
pub struct GraphIndex<'a> {
    by_id: HashMap<&'a str, &'a Node>,
}

impl<'a> GraphIndex<'a> {
    pub fn new(nodes: &'a [Node]) -> Self {
        let mut by_id = HashMap::with_capacity(nodes.len());
        for node in nodes {
            // First occurrence wins for duplicated ids.
            by_id.entry(node.id.as_str()).or_insert(node);
        }
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&'a Node> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Edges whose endpoints both exist, in insertion order.
    pub fn valid_edges<'e>(&'e self, edges: &'e [Edge]) -> impl Iterator<Item = &'e Edge> + 'e {
        edges
            .iter()
            .filter(move |edge| self.contains(&edge.source) && self.contains(&edge.target))
    }
}
