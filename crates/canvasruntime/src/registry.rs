use canvascore::{ExecutionError, ExecutorMetadata, NodeExecutor};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available executors, keyed by node type
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
    fallback: Option<Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
            fallback: None,
        }
    }

    /// Register an executor under its node type
    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
        let node_type = executor.node_type().to_string();
        tracing::info!("Registering node type: {}", node_type);
        self.executors.insert(node_type, executor);
    }

    /// Executor used for node types with no dedicated registration
    pub fn set_fallback(&mut self, executor: Arc<dyn NodeExecutor>) {
        tracing::info!("Registering fallback executor: {}", executor.node_type());
        self.fallback = Some(executor);
    }

    /// Executor for a node type, or the fallback
    pub fn resolve(&self, node_type: &str) -> Result<Arc<dyn NodeExecutor>, ExecutionError> {
        self.executors
            .get(node_type)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| {
                ExecutionError::Configuration(format!("Unknown node type: {}", node_type))
            })
    }

    /// Whether a dedicated executor exists (the fallback does not count)
    pub fn contains(&self, node_type: &str) -> bool {
        self.executors.contains_key(node_type)
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<ExecutorMetadata> {
        self.executors.get(node_type).map(|e| e.metadata())
    }

    pub fn fallback_metadata(&self) -> Option<ExecutorMetadata> {
        self.fallback.as_ref().map(|e| e.metadata())
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
