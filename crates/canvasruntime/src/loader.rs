//! Loading and checking graph snapshots before a run.

use crate::deps::try_extract_dependencies;
use crate::registry::ExecutorRegistry;
use crate::scheduler::find_cycles;
use canvascore::{FlowError, NodeId, Workflow};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Read a snapshot from a JSON file
pub fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow, FlowError> {
    let path = path.as_ref();
    tracing::debug!("Loading workflow from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    parse_workflow(&content)
}

pub fn parse_workflow(json: &str) -> Result<Workflow, FlowError> {
    let workflow: Workflow = serde_json::from_str(json)?;
    if workflow.nodes.iter().any(|node| node.id.is_empty()) {
        return Err(FlowError::InvalidGraph("node with an empty id".to_string()));
    }
    Ok(workflow)
}

/// Something that would make a run behave unexpectedly. None of these stop a
/// run from starting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum GraphIssue {
    DuplicateId { node_id: NodeId },
    DuplicateLabel { label: String, node_ids: Vec<NodeId> },
    DanglingEdge { source: NodeId, target: NodeId },
    Cycle { node_ids: Vec<NodeId> },
    UnknownNodeType { node_id: NodeId, node_type: String },
    UnparsableCode { node_id: NodeId, message: String },
}

impl std::fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphIssue::DuplicateId { node_id } => write!(f, "duplicate node id '{}'", node_id),
            GraphIssue::DuplicateLabel { label, node_ids } => write!(
                f,
                "label '{}' is shared by nodes {}; references resolve to '{}'",
                label,
                node_ids.join(", "),
                node_ids.first().map(String::as_str).unwrap_or_default()
            ),
            GraphIssue::DanglingEdge { source, target } => {
                write!(f, "edge {} -> {} names a missing node", source, target)
            }
            GraphIssue::Cycle { node_ids } => {
                write!(f, "cycle between {}; these nodes will not run", node_ids.join(", "))
            }
            GraphIssue::UnknownNodeType { node_id, node_type } => write!(
                f,
                "node '{}' has type '{}' with no registered executor",
                node_id, node_type
            ),
            GraphIssue::UnparsableCode { node_id, message } => {
                write!(f, "code of node '{}' does not parse: {}", node_id, message)
            }
        }
    }
}

/// Static checks over a snapshot. Unknown types are only reported when the
/// registry has no fallback executor.
pub fn validate(workflow: &Workflow, registry: &ExecutorRegistry) -> Vec<GraphIssue> {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) {
            issues.push(GraphIssue::DuplicateId {
                node_id: node.id.clone(),
            });
        }
    }

    let mut by_label: HashMap<&str, Vec<NodeId>> = HashMap::new();
    let mut label_order = Vec::new();
    for node in &workflow.nodes {
        if let Some(label) = node.label() {
            let ids = by_label.entry(label).or_default();
            if ids.is_empty() {
                label_order.push(label);
            }
            ids.push(node.id.clone());
        }
    }
    for label in label_order {
        if let Some(ids) = by_label.remove(label).filter(|ids| ids.len() > 1) {
            issues.push(GraphIssue::DuplicateLabel {
                label: label.to_string(),
                node_ids: ids,
            });
        }
    }

    for edge in &workflow.edges {
        if !seen.contains(edge.source.as_str()) || !seen.contains(edge.target.as_str()) {
            issues.push(GraphIssue::DanglingEdge {
                source: edge.source.clone(),
                target: edge.target.clone(),
            });
        }
    }

    for cycle in find_cycles(&workflow.nodes, &workflow.edges) {
        issues.push(GraphIssue::Cycle { node_ids: cycle });
    }

    let has_fallback = registry.fallback_metadata().is_some();
    for node in &workflow.nodes {
        if !has_fallback && !registry.contains(&node.node_type) {
            issues.push(GraphIssue::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
        if let Some(code) = node.code() {
            if let Err(err) = try_extract_dependencies(code) {
                issues.push(GraphIssue::UnparsableCode {
                    node_id: node.id.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvascore::{Edge, Node};

    #[test]
    fn editor_snapshot_parses() {
        let json = r#"{
            "nodes": [{"id": "1", "type": "code", "position": {"x": 1, "y": 2},
                       "data": {"label": "A", "code": "return 1"}}],
            "edges": []
        }"#;
        let workflow = parse_workflow(json).unwrap();
        assert_eq!(workflow.nodes[0].label(), Some("A"));
    }

    #[test]
    fn empty_ids_are_rejected() {
        let err = parse_workflow(r#"{"nodes": [{"id": "", "type": "code"}]}"#).unwrap_err();
        assert!(matches!(err, FlowError::InvalidGraph(_)));
        assert!(matches!(
            parse_workflow("not json").unwrap_err(),
            FlowError::Serialization(_)
        ));
    }

    #[test]
    fn validation_reports_every_issue() {
        let mut workflow = Workflow::new("checks");
        workflow.add_node(Node::new("1", "code").with_label("Same"));
        workflow.add_node(Node::new("2", "code").with_label("Same").with_data("code", "return ("));
        workflow.add_node(Node::new("2", "mystery"));
        workflow.edges.push(Edge::new("1", "ghost"));
        workflow.connect("1", "1");

        let mut registry = ExecutorRegistry::new();
        registry.register(std::sync::Arc::new(NoOp));
        let issues = validate(&workflow, &registry);

        assert!(issues.contains(&GraphIssue::DuplicateId { node_id: "2".into() }));
        assert!(issues.contains(&GraphIssue::DuplicateLabel {
            label: "Same".into(),
            node_ids: vec!["1".into(), "2".into()]
        }));
        assert!(issues.contains(&GraphIssue::DanglingEdge {
            source: "1".into(),
            target: "ghost".into()
        }));
        assert!(issues.contains(&GraphIssue::Cycle { node_ids: vec!["1".into()] }));
        assert!(issues.contains(&GraphIssue::UnknownNodeType {
            node_id: "2".into(),
            node_type: "mystery".into()
        }));
        assert!(issues
            .iter()
            .any(|issue| matches!(issue, GraphIssue::UnparsableCode { node_id, .. } if node_id == "2")));
    }

    struct NoOp;

    #[async_trait::async_trait]
    impl canvascore::NodeExecutor for NoOp {
        fn node_type(&self) -> &str {
            "code"
        }

        async fn execute(
            &self,
            _ctx: canvascore::NodeContext,
        ) -> Result<canvascore::Value, canvascore::ExecutionError> {
            Ok(canvascore::Value::Null)
        }
    }
}
