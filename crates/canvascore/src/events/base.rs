use crate::{NodeId, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Per-node execution status as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

/// Global state of a run. `Paused` is reserved; the orchestrator only moves
/// between `Idle` and `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Paused,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Idle => "idle",
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// Events emitted during workflow execution. Everything crossing to an
/// observer is carried by value in one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    ExecutionStateChanged {
        execution_id: ExecutionId,
        state: RunState,
        timestamp: DateTime<Utc>,
    },
    NodeStatusChanged {
        execution_id: ExecutionId,
        node_id: NodeId,
        status: NodeStatus,
        timestamp: DateTime<Utc>,
    },
    NodeResult {
        execution_id: ExecutionId,
        node_id: NodeId,
        result: Value,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        execution_id: ExecutionId,
        node_id: NodeId,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::ExecutionStateChanged { execution_id, .. }
            | ExecutionEvent::NodeStatusChanged { execution_id, .. }
            | ExecutionEvent::NodeResult { execution_id, .. }
            | ExecutionEvent::NodeEvent { execution_id, .. } => *execution_id,
        }
    }
}

/// Diagnostics attached to a single node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
}

/// Receiver side of the reporting contract.
///
/// Calls are fire-and-forget; implementations must not block and must keep
/// the order in which they were called.
pub trait ExecutionObserver: Send + Sync {
    fn on_node_status_change(&self, execution_id: ExecutionId, node_id: &str, status: NodeStatus);

    fn on_node_result(&self, execution_id: ExecutionId, node_id: &str, result: &Value);

    fn on_execution_state_change(&self, execution_id: ExecutionId, state: RunState);

    /// Optional: info and warning diagnostics for a node
    fn on_node_event(&self, _execution_id: ExecutionId, _node_id: &str, _event: NodeEvent) {}
}

/// Observer that discards everything.
pub struct NullObserver;

impl ExecutionObserver for NullObserver {
    fn on_node_status_change(&self, _: ExecutionId, _: &str, _: NodeStatus) {}

    fn on_node_result(&self, _: ExecutionId, _: &str, _: &Value) {}

    fn on_execution_state_change(&self, _: ExecutionId, _: RunState) {}
}

fn to_event(kind: EventKind<'_>, execution_id: ExecutionId) -> ExecutionEvent {
    let timestamp = Utc::now();
    match kind {
        EventKind::Status(node_id, status) => ExecutionEvent::NodeStatusChanged {
            execution_id,
            node_id: node_id.to_string(),
            status,
            timestamp,
        },
        EventKind::Result(node_id, result) => ExecutionEvent::NodeResult {
            execution_id,
            node_id: node_id.to_string(),
            result: result.clone(),
            timestamp,
        },
        EventKind::State(state) => ExecutionEvent::ExecutionStateChanged {
            execution_id,
            state,
            timestamp,
        },
        EventKind::Node(node_id, event) => ExecutionEvent::NodeEvent {
            execution_id,
            node_id: node_id.to_string(),
            event,
            timestamp,
        },
    }
}

enum EventKind<'a> {
    Status(&'a str, NodeStatus),
    Result(&'a str, &'a Value),
    State(RunState),
    Node(&'a str, NodeEvent),
}

/// Observer that forwards copies of every call over an ordered channel.
///
/// The receiving half is typically drained by a listener task on the other
/// side of the boundary.
#[derive(Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, execution_id: ExecutionId, kind: EventKind<'_>) {
        // A closed channel means the listener went away; the run carries on.
        let _ = self.sender.send(to_event(kind, execution_id));
    }
}

impl ExecutionObserver for ChannelObserver {
    fn on_node_status_change(&self, execution_id: ExecutionId, node_id: &str, status: NodeStatus) {
        self.send(execution_id, EventKind::Status(node_id, status));
    }

    fn on_node_result(&self, execution_id: ExecutionId, node_id: &str, result: &Value) {
        self.send(execution_id, EventKind::Result(node_id, result));
    }

    fn on_execution_state_change(&self, execution_id: ExecutionId, state: RunState) {
        self.send(execution_id, EventKind::State(state));
    }

    fn on_node_event(&self, execution_id: ExecutionId, node_id: &str, event: NodeEvent) {
        self.send(execution_id, EventKind::Node(node_id, event));
    }
}

/// Broadcast bus fanning events out to any number of subscribers
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}

impl ExecutionObserver for EventBus {
    fn on_node_status_change(&self, execution_id: ExecutionId, node_id: &str, status: NodeStatus) {
        self.emit(to_event(EventKind::Status(node_id, status), execution_id));
    }

    fn on_node_result(&self, execution_id: ExecutionId, node_id: &str, result: &Value) {
        self.emit(to_event(EventKind::Result(node_id, result), execution_id));
    }

    fn on_execution_state_change(&self, execution_id: ExecutionId, state: RunState) {
        self.emit(to_event(EventKind::State(state), execution_id));
    }

    fn on_node_event(&self, execution_id: ExecutionId, node_id: &str, event: NodeEvent) {
        self.emit(to_event(EventKind::Node(node_id, event), execution_id));
    }
}

/// Event emitter handed to executors for node-scoped diagnostics
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    node_id: NodeId,
    observer: Arc<dyn ExecutionObserver>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        node_id: impl Into<NodeId>,
        observer: Arc<dyn ExecutionObserver>,
    ) -> Self {
        Self {
            execution_id,
            node_id: node_id.into(),
            observer,
        }
    }

    /// Emitter that goes nowhere, for executors driven outside a run.
    pub fn detached(node_id: impl Into<NodeId>) -> Self {
        Self::new(Uuid::nil(), node_id, Arc::new(NullObserver))
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Emit a node-specific event
    pub fn emit(&self, event: NodeEvent) {
        self.observer
            .on_node_event(self.execution_id, &self.node_id, event);
    }

    /// Emit info message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    /// Emit warning message
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_observer_preserves_call_order() {
        let (observer, mut receiver) = ChannelObserver::new();
        let id = Uuid::new_v4();

        observer.on_execution_state_change(id, RunState::Running);
        observer.on_node_status_change(id, "a", NodeStatus::Running);
        observer.on_node_result(id, "a", &Value::Number(2.0));
        observer.on_node_status_change(id, "a", NodeStatus::Success);
        observer.on_execution_state_change(id, RunState::Idle);

        let mut kinds = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            assert_eq!(event.execution_id(), id);
            kinds.push(match event {
                ExecutionEvent::ExecutionStateChanged { state, .. } => format!("state:{}", state),
                ExecutionEvent::NodeStatusChanged { status, .. } => format!("status:{}", status),
                ExecutionEvent::NodeResult { result, .. } => format!("result:{}", result),
                ExecutionEvent::NodeEvent { .. } => "event".to_string(),
            });
        }

        assert_eq!(
            kinds,
            vec![
                "state:running",
                "status:running",
                "result:2",
                "status:success",
                "state:idle"
            ]
        );
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&NodeStatus::Success).unwrap(), "\"success\"");
        assert_eq!(serde_json::to_string(&RunState::Paused).unwrap(), "\"paused\"");
    }

    #[test]
    fn emitter_reaches_observer() {
        let (observer, mut receiver) = ChannelObserver::new();
        let emitter = EventEmitter::new(Uuid::new_v4(), "n1", Arc::new(observer));
        emitter.warn("careful");

        match receiver.try_recv().unwrap() {
            ExecutionEvent::NodeEvent { node_id, event, .. } => {
                assert_eq!(node_id, "n1");
                assert_eq!(event, NodeEvent::Warning { message: "careful".into() });
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
