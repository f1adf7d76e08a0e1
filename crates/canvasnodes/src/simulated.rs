use async_trait::async_trait;
use canvascore::{ExecutionError, ExecutorMetadata, NodeContext, NodeExecutor, Value};
use canvasruntime::RuntimeConfig;
use chrono::{SecondsFormat, Utc};
use tokio::time::{sleep, Duration};

pub const SIMULATED_TYPE: &str = "simulated";

/// Stand-in for node types without a real executor: waits, then reports
/// success
pub struct SimulatedExecutor {
    delay: Duration,
}

impl SimulatedExecutor {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_delay(config.simulated_delay)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl NodeExecutor for SimulatedExecutor {
    fn node_type(&self) -> &str {
        SIMULATED_TYPE
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, ExecutionError> {
        tracing::debug!(
            "Simulating {} node {} for {}ms",
            ctx.node.node_type,
            ctx.node.id,
            self.delay.as_millis()
        );
        sleep(self.delay).await;

        Ok(Value::object([
            (
                "executedAt",
                Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            ),
            (
                "message",
                Value::from(format!("Node {} executed successfully", ctx.node.id)),
            ),
        ]))
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Simulated execution for node types without an executor".to_string(),
            category: "general".to_string(),
        }
    }
}
