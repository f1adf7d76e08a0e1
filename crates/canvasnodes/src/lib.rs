//! Standard executor library
//!
//! Built-in executors for the node types the editor produces, plus the
//! simulated fallback used for every other type.

mod code;
mod http;
mod simulated;

pub use code::{CodeExecutor, CODE_TYPE, DENIED_GLOBALS};
pub use http::{HttpRequestConfig, HttpRequestExecutor, HTTP_REQUEST_TYPE};
pub use simulated::{SimulatedExecutor, SIMULATED_TYPE};

use canvasruntime::{ExecutorRegistry, RuntimeConfig};
use std::sync::Arc;

/// Register all standard executors with a registry
pub fn register_all(registry: &mut ExecutorRegistry, config: &RuntimeConfig) {
    registry.register(Arc::new(HttpRequestExecutor::new(config)));
    registry.register(Arc::new(CodeExecutor::new(config)));
    registry.set_fallback(Arc::new(SimulatedExecutor::new(config)));
}

/// Registry holding the standard executors
pub fn standard_registry(config: &RuntimeConfig) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    register_all(&mut registry, config);
    registry
}
