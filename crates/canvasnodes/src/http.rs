use async_trait::async_trait;
use canvascore::{ExecutionError, ExecutorMetadata, NodeContext, NodeExecutor, Value};
use canvasruntime::RuntimeConfig;
use reqwest::Method;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const HTTP_REQUEST_TYPE: &str = "http-request";

/// Configuration read from an `http-request` node's data
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub use_proxy: bool,
    /// Strings are sent verbatim, anything else as JSON
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpRequestConfig {
    pub fn method(&self) -> Result<Method, ExecutionError> {
        match self.method.trim().to_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "PATCH" => Ok(Method::PATCH),
            "DELETE" => Ok(Method::DELETE),
            other => Err(ExecutionError::Configuration(format!(
                "Unsupported method: {}",
                other
            ))),
        }
    }

    /// Address actually requested, with the proxy prefix applied
    pub fn target_url(&self, proxy_prefix: &str) -> String {
        if self.use_proxy {
            format!("{}{}", proxy_prefix, self.url)
        } else {
            self.url.clone()
        }
    }
}

/// Remote-call executor: one request, JSON body back
pub struct HttpRequestExecutor {
    client: reqwest::Client,
    proxy_prefix: String,
    timeout: Duration,
}

impl HttpRequestExecutor {
    pub fn new(config: &RuntimeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            proxy_prefix: config.proxy_prefix.clone(),
            timeout: config.http_timeout,
        }
    }
}

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    fn node_type(&self) -> &str {
        HTTP_REQUEST_TYPE
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, ExecutionError> {
        let config: HttpRequestConfig = ctx.node.config()?;
        if config.url.trim().is_empty() {
            return Err(ExecutionError::Configuration(
                "HTTP Request node missing URL".to_string(),
            ));
        }
        let method = config.method()?;
        let url = config.target_url(&self.proxy_prefix);

        ctx.events.info(format!("{} {}", method, url));

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (key, value) in &config.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if matches!(method, Method::POST | Method::PUT | Method::PATCH) {
            match &config.body {
                Some(Value::String(text)) => request = request.body(text.clone()),
                Some(Value::Null) | None => {}
                Some(value) => request = request.json(&value.to_json()),
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ExecutionError::Timeout {
                    millis: self.timeout.as_millis() as u64,
                }
            } else {
                ExecutionError::remote(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        ctx.events.info(format!("Response status: {}", status.as_u16()));
        if !status.is_success() {
            return Err(ExecutionError::remote_status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExecutionError::remote(format!("Failed to read response: {}", e)))?;
        parse_body(&body)
    }

    fn metadata(&self) -> ExecutorMetadata {
        ExecutorMetadata {
            description: "Make HTTP requests and return the JSON response".to_string(),
            category: "http".to_string(),
        }
    }
}

fn parse_body(body: &str) -> Result<Value, ExecutionError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str::<serde_json::Value>(body)
        .map(Value::from)
        .map_err(|e| ExecutionError::remote(format!("Invalid JSON response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvascore::Node;

    #[test]
    fn config_defaults() {
        let node = Node::new("1", HTTP_REQUEST_TYPE).with_data("url", "https://api.test/items");
        let config: HttpRequestConfig = node.config().unwrap();
        assert_eq!(config.method().unwrap(), Method::GET);
        assert!(!config.use_proxy);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn proxy_prefix_is_prepended() {
        let node = Node::new("1", HTTP_REQUEST_TYPE)
            .with_data("url", "https://api.test/items")
            .with_data("useProxy", true);
        let config: HttpRequestConfig = node.config().unwrap();
        assert_eq!(
            config.target_url("https://cors-anywhere.herokuapp.com/"),
            "https://cors-anywhere.herokuapp.com/https://api.test/items"
        );
    }

    #[test]
    fn methods_are_case_insensitive_and_limited() {
        let node = Node::new("1", HTTP_REQUEST_TYPE).with_data("method", "patch");
        let config: HttpRequestConfig = node.config().unwrap();
        assert_eq!(config.method().unwrap(), Method::PATCH);

        let node = Node::new("1", HTTP_REQUEST_TYPE).with_data("method", "TRACE");
        let config: HttpRequestConfig = node.config().unwrap();
        assert!(matches!(
            config.method(),
            Err(ExecutionError::Configuration(_))
        ));
    }

    #[test]
    fn empty_body_is_null_and_garbage_is_an_error() {
        assert_eq!(parse_body("  ").unwrap(), Value::Null);
        assert_eq!(parse_body("[1]").unwrap(), Value::Array(vec![Value::Number(1.0)]));
        assert!(matches!(
            parse_body("<html>"),
            Err(ExecutionError::RemoteCall { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn missing_url_is_a_configuration_error() {
        let executor = HttpRequestExecutor::new(&RuntimeConfig::default());
        let ctx = NodeContext::new(
            Node::new("1", HTTP_REQUEST_TYPE),
            canvascore::EventEmitter::detached("1"),
        );
        let err = executor.execute(ctx).await.unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Configuration("HTTP Request node missing URL".into())
        );
    }
}
