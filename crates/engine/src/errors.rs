use thiserror::Error;

/// Errors emitted by browser-automation engines.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The underlying session could not be brought up.
    #[error("engine initialization failed: {0}")]
    Init(String),

    /// Navigation did not commit.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// A UI action could not be resolved or performed.
    #[error("action failed: {0}")]
    Action(String),

    /// Transport or wire-format trouble talking to the backend.
    #[error("engine protocol error: {0}")]
    Protocol(String),

    /// An operation exceeded its time bound.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The handle was closed; no further operations are possible.
    #[error("engine session is closed")]
    Closed,
}

impl EngineError {
    pub fn init(message: impl Into<String>) -> Self {
        Self::Init(message.into())
    }

    pub fn navigation(message: impl Into<String>) -> Self {
        Self::Navigation(message.into())
    }

    pub fn action(message: impl Into<String>) -> Self {
        Self::Action(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}
