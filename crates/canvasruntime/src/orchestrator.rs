use crate::context::{build_context, LabelIndex, ResultStore};
use crate::deps::try_extract_dependencies;
use crate::registry::ExecutorRegistry;
use crate::scheduler::{find_cycles, Schedule};
use canvascore::{
    Edge, EventEmitter, ExecutionError, ExecutionId, ExecutionObserver, GraphIndex, Node,
    NodeContext, NodeId, NodeStatus, RunState, Value,
};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs a graph snapshot node by node in topological order.
///
/// Owns the result store, the per-node statuses and the run state; all three
/// are reset whenever a new run starts.
pub struct Orchestrator {
    registry: Arc<ExecutorRegistry>,
    results: ResultStore,
    statuses: BTreeMap<NodeId, NodeStatus>,
    state: RunState,
}

impl Orchestrator {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            registry,
            results: ResultStore::new(),
            statuses: BTreeMap::new(),
            state: RunState::Idle,
        }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    /// Results of the latest run, in execution order
    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.statuses.get(node_id).copied()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute the graph. Failures never escape: they end up in the
    /// observer callbacks and in the returned report.
    pub async fn run(
        &mut self,
        nodes: &[Node],
        edges: &[Edge],
        observer: Arc<dyn ExecutionObserver>,
    ) -> RunReport {
        self.run_with_cancellation(nodes, edges, observer, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancellation(
        &mut self,
        nodes: &[Node],
        edges: &[Edge],
        observer: Arc<dyn ExecutionObserver>,
        cancellation: CancellationToken,
    ) -> RunReport {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        self.results.clear();
        self.statuses.clear();
        self.set_state(&observer, execution_id, RunState::Running);

        let schedule = Schedule::build(nodes, edges);
        if !schedule.is_complete() {
            for cycle in find_cycles(nodes, edges) {
                tracing::warn!("Cycle detected between nodes: {}", cycle.join(" -> "));
            }
            tracing::warn!(
                "Skipping {} node(s) that depend on a cycle: {}",
                schedule.excluded.len(),
                schedule.excluded.join(", ")
            );
        }

        let index = GraphIndex::new(nodes);
        let labels = LabelIndex::build(nodes);
        tracing::info!(
            %execution_id,
            nodes = schedule.sequence.len(),
            "Starting workflow execution"
        );

        let mut outcome = RunOutcome::Completed;
        for node_id in &schedule.sequence {
            let Some(node) = index.get(node_id) else {
                continue;
            };

            if cancellation.is_cancelled() {
                tracing::info!("Execution cancelled before node {}", node.display_name());
                outcome = RunOutcome::Cancelled;
                break;
            }

            self.set_status(&observer, execution_id, node_id, NodeStatus::Running);
            let started = Instant::now();
            let result = self
                .execute_node(node, &labels, &observer, execution_id, &cancellation)
                .await;

            match result {
                Ok(value) => {
                    tracing::info!(
                        "Node {} completed in {}ms",
                        node.display_name(),
                        started.elapsed().as_millis()
                    );
                    observer.on_node_result(execution_id, node_id, &value);
                    self.results.record(node_id.clone(), value);
                    self.set_status(&observer, execution_id, node_id, NodeStatus::Success);
                }
                Err(error) => {
                    tracing::error!("Node {} failed: {}", node.display_name(), error);
                    self.set_status(&observer, execution_id, node_id, NodeStatus::Error);
                    outcome = match error {
                        ExecutionError::Cancelled => RunOutcome::Cancelled,
                        error => RunOutcome::Halted {
                            node_id: node_id.clone(),
                            error,
                        },
                    };
                    break;
                }
            }
        }

        self.set_state(&observer, execution_id, RunState::Idle);
        tracing::info!(
            %execution_id,
            "Workflow execution finished in {}ms",
            start_time.elapsed().as_millis()
        );

        RunReport {
            execution_id,
            sequence: schedule.sequence,
            excluded: schedule.excluded,
            results: self.results.to_map(),
            statuses: self.statuses.clone(),
            outcome,
        }
    }

    async fn execute_node(
        &self,
        node: &Node,
        labels: &LabelIndex,
        observer: &Arc<dyn ExecutionObserver>,
        execution_id: ExecutionId,
        cancellation: &CancellationToken,
    ) -> Result<Value, ExecutionError> {
        let events = EventEmitter::new(execution_id, node.id.clone(), observer.clone());

        let dependencies = match node.code() {
            Some(code) => try_extract_dependencies(code).unwrap_or_else(|err| {
                tracing::warn!(
                    "Dependency analysis skipped for {}: {}",
                    node.display_name(),
                    err
                );
                events.warn(format!("Dependency analysis skipped: {}", err));
                BTreeSet::new()
            }),
            None => BTreeSet::new(),
        };
        let (context, unresolved) = build_context(&dependencies, labels, &self.results);
        for missing in &unresolved {
            events.warn(format!("Unresolved dependency: {}", missing));
        }

        let executor = self.registry.resolve(&node.node_type)?;
        let mut ctx = NodeContext::new(node.clone(), events).with_context(context);
        ctx.cancellation = cancellation.child_token();

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(ExecutionError::Cancelled),
            result = executor.execute(ctx) => result,
        }
    }

    fn set_status(
        &mut self,
        observer: &Arc<dyn ExecutionObserver>,
        execution_id: ExecutionId,
        node_id: &str,
        status: NodeStatus,
    ) {
        self.statuses.insert(node_id.to_string(), status);
        observer.on_node_status_change(execution_id, node_id, status);
    }

    fn set_state(
        &mut self,
        observer: &Arc<dyn ExecutionObserver>,
        execution_id: ExecutionId,
        state: RunState,
    ) {
        self.state = state;
        observer.on_execution_state_change(execution_id, state);
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub execution_id: ExecutionId,
    pub sequence: Vec<NodeId>,
    /// Nodes left out because of a cycle
    pub excluded: Vec<NodeId>,
    pub results: BTreeMap<NodeId, Value>,
    /// Nodes the run never reached have no entry
    pub statuses: BTreeMap<NodeId, NodeStatus>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }

    pub fn result(&self, node_id: &str) -> Option<&Value> {
        self.results.get(node_id)
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.statuses.get(node_id).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Halted {
        node_id: NodeId,
        #[serde(serialize_with = "serialize_error")]
        error: ExecutionError,
    },
    Cancelled,
}

fn serialize_error<S: Serializer>(error: &ExecutionError, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(2))?;
    map.serialize_entry("kind", error.kind())?;
    map.serialize_entry("message", &error.to_string())?;
    map.end()
}
