//! Workflow execution runtime
//!
//! This crate provides the engine that runs a graph snapshot: deterministic
//! scheduling, dependency detection over node logic, context injection, the
//! executor registry and the orchestrator that drives one node at a time.

mod context;
mod deps;
mod loader;
mod orchestrator;
mod registry;
mod runtime;
mod scheduler;

pub use context::{build_context, LabelIndex, ResultStore, UnresolvedDependency};
pub use deps::{extract_dependencies, try_extract_dependencies, NODE_REFERENCE};
pub use loader::{load_workflow, parse_workflow, validate, GraphIssue};
pub use orchestrator::{Orchestrator, RunOutcome, RunReport};
pub use registry::ExecutorRegistry;
pub use runtime::{RunHandle, RuntimeConfig, WorkflowRuntime};
pub use scheduler::{find_cycles, schedule, Schedule};
