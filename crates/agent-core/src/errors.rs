use thiserror::Error;

use webpilot_engine::EngineError;
use webpilot_registry::RegistryError;

/// Errors emitted by the agent core.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The browser session failed to initialize. Fatal, never retried, and
    /// raised before any history is accumulated.
    #[error("session initialization failed: {0}")]
    SessionInit(String),

    /// The reasoning service was unreachable or returned output that does
    /// not satisfy the response contract. Fatal to the current run; the
    /// caller may resubmit the same goal.
    #[error("planning failed: {0}")]
    Planning(String),

    /// A single step's browser-side action failed. The session handle
    /// remains usable; the run is aborted.
    #[error("step execution failed: {0}")]
    Execution(String),

    /// The run performed the configured maximum number of steps without the
    /// planner choosing a terminal step.
    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u32 },

    /// The caller misused the orchestration surface (resume on a
    /// non-suspended run, unknown session, out-of-range choice).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AgentError {
    pub fn planning(message: impl Into<String>) -> Self {
        Self::Planning(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

impl From<RegistryError> for AgentError {
    fn from(err: RegistryError) -> Self {
        Self::SessionInit(err.to_string())
    }
}

impl From<EngineError> for AgentError {
    fn from(err: EngineError) -> Self {
        Self::Execution(err.to_string())
    }
}
