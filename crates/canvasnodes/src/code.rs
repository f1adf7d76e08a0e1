use async_trait::async_trait;
use canvascore::{ExecutionError, ExecutorMetadata, NodeContext, NodeExecutor, Value};
use canvasruntime::{RuntimeConfig, NODE_REFERENCE};
use canvasscript::{Limits, Sandbox, ScriptError};

pub const CODE_TYPE: &str = "code";

/// Names bound to `undefined` inside every logic body.
pub const DENIED_GLOBALS: &[&str] = &[
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
    "postMessage",
    "importScripts",
    "localStorage",
    "sessionStorage",
    "indexedDB",
    "caches",
    "self",
    "globalThis",
];

/// Runs a node's logic body in an embedded JavaScript sandbox on a blocking
/// worker thread.
pub struct CodeExecutor {
    limits: Limits,
}

impl CodeExecutor {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_limits(Limits {
            timeout: Some(config.script_timeout),
            memory_limit: config.script_memory_limit,
            ..Limits::default()
        })
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl NodeExecutor for CodeExecutor {
    fn node_type(&self) -> &str {
        CODE_TYPE
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, ExecutionError> {
        let code = match ctx.node.code() {
            Some(code) if !code.trim().is_empty() => code.to_string(),
            _ => return Ok(Value::Null),
        };
        let context = ctx.context.to_value();
        let mut sandbox = Sandbox::new(self.limits);
        sandbox.define_global(NODE_REFERENCE, &context);
        for name in DENIED_GLOBALS {
            sandbox.hide_global(name);
        }
        let cancellation = ctx.cancellation.clone();
        sandbox.interrupt_when(move || cancellation.is_cancelled());

        let outcome = tokio::task::spawn_blocking(move || sandbox.run(&code))
            .await
            .map_err(|e| ExecutionError::Script(format!("Script worker failed: {}", e)))?;

        for line in outcome.logs {
            ctx.events.info(line);
        }

        outcome.result.map_err(|e| {
            tracing::debug!("Logic body of {} failed: {}", ctx.node.display_name(), e);
            match e {
                ScriptError::Interrupted => ExecutionError::Cancelled,
                other => ExecutionError::Script(other.to_string()),
            }
        })
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Run JavaScript logic over upstream results".to_string(),
            category: "logic".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvascore::{ChannelObserver, EventEmitter, ExecutionContext, ExecutionEvent, Node, NodeEvent};
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx(code: &str) -> NodeContext {
        NodeContext::new(
            Node::new("n", CODE_TYPE).with_data("code", code),
            EventEmitter::detached("n"),
        )
    }

    async fn run(code: &str) -> Result<Value, ExecutionError> {
        CodeExecutor::new(&RuntimeConfig::default()).execute(ctx(code)).await
    }

    #[tokio::test]
    async fn returns_value_of_the_body() {
        assert_eq!(run("return 1 + 1").await.unwrap(), Value::Number(2.0));
        assert_eq!(run("'bare'").await.unwrap(), Value::from("bare"));
    }

    #[tokio::test]
    async fn empty_or_missing_code_is_null() {
        assert_eq!(run("   ").await.unwrap(), Value::Null);
        let executor = CodeExecutor::new(&RuntimeConfig::default());
        let ctx = NodeContext::new(Node::new("n", CODE_TYPE), EventEmitter::detached("n"));
        assert_eq!(executor.execute(ctx).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn context_is_exposed_under_node_reference() {
        let mut context = ExecutionContext::new();
        context.insert("Numbers", Value::Array(vec![Value::Number(1.0), Value::Number(2.0)]));
        let ctx = ctx("return $node['Numbers'].data.length").with_context(context);

        let result = CodeExecutor::new(&RuntimeConfig::default())
            .execute(ctx)
            .await
            .unwrap();
        assert_eq!(result, Value::Number(2.0));
    }

    #[tokio::test]
    async fn denied_globals_are_undefined() {
        for name in DENIED_GLOBALS {
            let result = run(&format!("return typeof {}", name)).await.unwrap();
            assert_eq!(result, Value::from("undefined"), "{} should be hidden", name);
        }
        let err = run("return fetch('https://example.com')").await.unwrap_err();
        assert!(
            matches!(&err, ExecutionError::Script(message) if message.starts_with("TypeError")),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn failures_become_script_errors() {
        assert!(matches!(run("throw new Error('x')").await, Err(ExecutionError::Script(_))));
        assert!(matches!(run("return (").await, Err(ExecutionError::Script(_))));

        let executor = CodeExecutor::with_limits(Limits {
            timeout: Some(Duration::from_millis(20)),
            ..Limits::default()
        });
        let err = executor.execute(ctx("while (true) {}")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Script(message) if message.contains("timed out")));
    }

    #[tokio::test]
    async fn cancellation_stops_a_running_body() {
        let ctx = ctx("while (true) {}");
        let token = ctx.cancellation.clone();
        let handle = tokio::spawn(async move {
            CodeExecutor::with_limits(Limits::default()).execute(ctx).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("body should stop after cancellation")
            .unwrap();
        assert_eq!(result, Err(ExecutionError::Cancelled));
    }

    #[tokio::test]
    async fn oversized_strings_fail_the_node() {
        let err = run("return 'a'.repeat(1e13).length").await.unwrap_err();
        assert!(
            matches!(&err, ExecutionError::Script(message) if message.starts_with("RangeError")),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn console_output_is_forwarded_as_info() {
        let (observer, mut receiver) = ChannelObserver::new();
        let events = EventEmitter::new(uuid::Uuid::new_v4(), "n", Arc::new(observer));
        let ctx = NodeContext::new(
            Node::new("n", CODE_TYPE).with_data("code", "console.log('hi', 1); return null"),
            events,
        );

        CodeExecutor::new(&RuntimeConfig::default())
            .execute(ctx)
            .await
            .unwrap();

        match receiver.try_recv().unwrap() {
            ExecutionEvent::NodeEvent { event, .. } => {
                assert_eq!(event, NodeEvent::Info { message: "hi 1".into() });
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
