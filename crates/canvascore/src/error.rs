use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single node execution. Every variant halts the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// The node is missing required configuration (e.g. no target address).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The remote call failed or answered with a non-success status.
    #[error("{}", remote_call_message(.status, .message))]
    RemoteCall {
        status: Option<u16>,
        message: String,
    },

    /// The node's logic body threw, failed to parse or exceeded its limits.
    #[error("Script execution error: {0}")]
    Script(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl ExecutionError {
    pub fn remote_status(status: u16) -> Self {
        ExecutionError::RemoteCall {
            status: Some(status),
            message: format!("HTTP Error: {}", status),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        ExecutionError::RemoteCall {
            status: None,
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used in events and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::Configuration(_) => "configuration",
            ExecutionError::RemoteCall { .. } => "remote_call",
            ExecutionError::Script(_) => "script",
            ExecutionError::Timeout { .. } => "timeout",
            ExecutionError::Cancelled => "cancelled",
        }
    }
}

fn remote_call_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Remote call error (status {}): {}", code, message),
        None => format!("Remote call error: {}", message),
    }
}
