use thiserror::Error;

/// The logic body could not be parsed, or was rejected before parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure while running a logic body.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// Rejected by the source checks before reaching the engine.
    #[error("SyntaxError: {0}")]
    Rejected(#[from] ParseError),

    /// A value thrown by the body (syntax errors included) that nothing
    /// caught, rendered as `Name: message`.
    #[error("{0}")]
    Thrown(String),

    #[error("Script timed out after {0} ms")]
    TimedOut(u64),

    #[error("Script interrupted")]
    Interrupted,

    #[error("Result is not representable: {0}")]
    Unrepresentable(String),

    /// The engine itself failed (setup, never-settling promise).
    #[error("Script engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, ScriptError>;

impl From<rquickjs::Error> for ScriptError {
    fn from(err: rquickjs::Error) -> Self {
        ScriptError::Engine(err.to_string())
    }
}
