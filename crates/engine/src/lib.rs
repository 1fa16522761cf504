//! Browser-automation engine contract.
//!
//! The agent core drives browsers exclusively through [`BrowserEngine`], so
//! any automation backend can plug in: the bundled [`RemoteEngine`] speaks
//! JSON to a remote automation service, while [`ScriptedEngine`] provides a
//! deterministic in-memory stand-in for tests and offline demos.

mod errors;
pub mod remote;
pub mod scripted;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use webpilot_core_types::{ActionDescriptor, SessionId};

pub use errors::EngineError;
pub use remote::{RemoteEngine, RemoteEngineFactory};
pub use scripted::{EngineCall, ScriptedEngine, ScriptedEngineFactory};

/// What the executor hands to [`BrowserEngine::perform_action`].
#[derive(Clone, Debug, PartialEq)]
pub enum ActInvocation {
    /// Natural-language directive the engine resolves to a UI action.
    Freeform(String),
    /// Previously observed action replayed verbatim.
    Structured(ActionDescriptor),
}

/// One live browser-automation context.
///
/// Every operation may fail with an engine-specific error; callers treat
/// any such failure uniformly as an execution failure. A failed operation
/// must leave the handle usable for subsequent calls.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Bring the underlying session up. Called once per handle.
    async fn init(&self) -> Result<(), EngineError>;

    /// Load a URL, returning once navigation commits (not full load).
    async fn goto_url(&self, url: &str, timeout: Duration) -> Result<(), EngineError>;

    /// Perform one UI action.
    async fn perform_action(&self, invocation: &ActInvocation) -> Result<(), EngineError>;

    /// Extract structured data per the natural-language instruction. The
    /// payload shape is engine-defined and opaque to callers.
    async fn extract(&self, instruction: &str) -> Result<Value, EngineError>;

    /// Enumerate candidate actions matching the instruction.
    async fn observe(&self, instruction: &str) -> Result<Vec<ActionDescriptor>, EngineError>;

    /// Pop one entry of browser history.
    async fn go_back(&self) -> Result<(), EngineError>;

    /// URL of the page currently shown.
    async fn current_url(&self) -> Result<String, EngineError>;

    /// Capture the current viewport as encoded image bytes.
    async fn capture_screenshot(&self) -> Result<Vec<u8>, EngineError>;

    /// Tear the session down. Further calls must fail with
    /// [`EngineError::Closed`].
    async fn close(&self) -> Result<(), EngineError>;

    /// Human-viewable debug URL for the in-progress browser, if the backend
    /// exposes one. Known only after `init`.
    fn live_view_url(&self) -> Option<String> {
        None
    }
}

/// Constructs engines bound to session identifiers.
pub trait EngineFactory: Send + Sync {
    fn create(&self, session: &SessionId) -> Result<Arc<dyn BrowserEngine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: Fn(&SessionId) -> Result<Arc<dyn BrowserEngine>, EngineError> + Send + Sync,
{
    fn create(&self, session: &SessionId) -> Result<Arc<dyn BrowserEngine>, EngineError> {
        self(session)
    }
}
