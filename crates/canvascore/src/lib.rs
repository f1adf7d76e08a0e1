//! Core abstractions for the canvas workflow engine
//!
//! This crate provides the graph model, the dynamic value type, the executor
//! trait and the observer contract that every other crate depends on.

mod error;
pub mod events;
mod node;
mod value;
mod workflow;

pub use error::{ExecutionError, FlowError};
pub use events::*;
pub use node::{ExecutionContext, ExecutorMetadata, NodeContext, NodeExecutor};
pub use value::Value;
pub use workflow::{Edge, GraphIndex, Node, NodeId, Workflow, CODE_KEY, LABEL_KEY};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
