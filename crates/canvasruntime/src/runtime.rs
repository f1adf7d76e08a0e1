use crate::orchestrator::{Orchestrator, RunReport};
use crate::registry::ExecutorRegistry;
use canvascore::{
    ChannelObserver, Edge, EventBus, ExecutionEvent, ExecutionObserver, Node, Workflow,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Main runtime for executing workflows
pub struct WorkflowRuntime {
    registry: Arc<ExecutorRegistry>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
}

impl WorkflowRuntime {
    /// Create a runtime around a populated registry
    pub fn new(registry: ExecutorRegistry, config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(registry), config)
    }

    pub fn with_registry(registry: Arc<ExecutorRegistry>, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self {
            registry,
            event_bus,
            config,
        }
    }

    /// Get access to the executor registry
    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// A fresh orchestrator sharing this runtime's registry
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.registry.clone())
    }

    /// Execute a graph snapshot, reporting to the given observer
    pub async fn run_workflow(
        &self,
        nodes: &[Node],
        edges: &[Edge],
        observer: Arc<dyn ExecutionObserver>,
    ) -> RunReport {
        self.orchestrator().run(nodes, edges, observer).await
    }

    /// Execute a workflow, publishing events on the runtime's bus
    pub async fn execute(&self, workflow: &Workflow) -> RunReport {
        let observer: Arc<dyn ExecutionObserver> = self.event_bus.clone();
        self.run_workflow(&workflow.nodes, &workflow.edges, observer)
            .await
    }

    /// Move a snapshot into its own task. Events arrive on the returned
    /// handle in emission order.
    pub fn spawn(&self, workflow: Workflow) -> RunHandle {
        let (observer, events) = ChannelObserver::new();
        let cancellation = CancellationToken::new();
        let mut orchestrator = self.orchestrator();
        let token = cancellation.clone();

        let join = tokio::spawn(async move {
            orchestrator
                .run_with_cancellation(&workflow.nodes, &workflow.edges, Arc::new(observer), token)
                .await
        });

        RunHandle {
            events,
            join,
            cancellation,
        }
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Handle on a run executing in a separate task
pub struct RunHandle {
    pub events: mpsc::UnboundedReceiver<ExecutionEvent>,
    join: JoinHandle<RunReport>,
    cancellation: CancellationToken,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Wait for the run to finish
    pub async fn join(self) -> Result<RunReport, JoinError> {
        self.join.await
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Delay of the fallback executor
    pub simulated_delay: Duration,
    /// Prefix prepended to remote-call addresses when `useProxy` is set
    pub proxy_prefix: String,
    pub http_timeout: Duration,
    /// Heap available to each logic body, in bytes
    pub script_memory_limit: usize,
    pub script_timeout: Duration,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            simulated_delay: Duration::from_millis(800),
            proxy_prefix: "https://cors-anywhere.herokuapp.com/".to_string(),
            http_timeout: Duration::from_secs(30),
            script_memory_limit: 64 * 1024 * 1024,
            script_timeout: Duration::from_secs(5),
            event_buffer_size: 1000,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `CANVAS_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse_var::<u64>(&lookup, "CANVAS_SIMULATED_DELAY_MS") {
            config.simulated_delay = Duration::from_millis(ms);
        }
        if let Some(prefix) = lookup("CANVAS_PROXY_PREFIX") {
            config.proxy_prefix = prefix;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CANVAS_HTTP_TIMEOUT_MS") {
            config.http_timeout = Duration::from_millis(ms);
        }
        if let Some(bytes) = parse_var(&lookup, "CANVAS_SCRIPT_MEMORY_LIMIT") {
            config.script_memory_limit = bytes;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CANVAS_SCRIPT_TIMEOUT_MS") {
            config.script_timeout = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var(&lookup, "CANVAS_EVENT_BUFFER") {
            config.event_buffer_size = size;
        }
        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}
