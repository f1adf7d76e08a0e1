use crate::{events::EventEmitter, ExecutionError, Node, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Execution strategy for one node type
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Node type this executor handles (e.g. "http-request", "code")
    fn node_type(&self) -> &str;

    /// Execute the node with the given context
    async fn execute(&self, ctx: NodeContext) -> Result<Value, ExecutionError>;

    /// Optional: description used by node listings
    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata::default()
    }
}

/// Metadata about an executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorMetadata {
    pub description: String,
    pub category: String,
}

impl Default for ExecutorMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Upstream results injected into a node, keyed by dependency label.
///
/// Each entry is exposed to node logic as `{ "data": <result> }`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    entries: BTreeMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, result: Value) {
        self.entries.insert(label.into(), result);
    }

    /// Raw result recorded for a label
    pub fn data(&self, label: &str) -> Option<&Value> {
        self.entries.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `{label: {data: result}}` mapping handed to node logic
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(label, result)| {
                    (label.clone(), Value::object([("data", result.clone())]))
                })
                .collect(),
        )
    }
}

/// Execution context passed to each executor
#[derive(Clone)]
pub struct NodeContext {
    /// Snapshot of the node being executed
    pub node: Node,

    /// Resolved upstream data
    pub context: ExecutionContext,

    /// Event emitter for node diagnostics
    pub events: EventEmitter,

    /// Cancellation token of the surrounding run
    pub cancellation: CancellationToken,
}

impl NodeContext {
    pub fn new(node: Node, events: EventEmitter) -> Self {
        Self {
            node,
            context: ExecutionContext::new(),
            events,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    /// Get a config value from the node's data
    pub fn get_config(&self, name: &str) -> Option<&Value> {
        self.node.data.get(name)
    }

    /// Get required config value or return error
    pub fn require_config(&self, name: &str) -> Result<&Value, ExecutionError> {
        self.get_config(name)
            .ok_or_else(|| ExecutionError::Configuration(format!("Missing config: {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_results_under_data() {
        let mut context = ExecutionContext::new();
        context.insert("Fetch", Value::object([("x", Value::Number(5.0))]));

        let expected = Value::object([(
            "Fetch",
            Value::object([("data", Value::object([("x", Value::Number(5.0))]))]),
        )]);
        assert_eq!(context.to_value(), expected);
        assert_eq!(context.labels().collect::<Vec<_>>(), vec!["Fetch"]);
    }
}
