//! Deterministic in-memory engine for tests and offline demos.
//!
//! Observation and extraction results are scripted up front; every call is
//! recorded so tests can assert on exactly what the core dispatched.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use webpilot_core_types::{ActionDescriptor, SessionId};

use crate::{ActInvocation, BrowserEngine, EngineError, EngineFactory};

/// Record of one dispatched engine operation.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    Init,
    Goto(String),
    Act(ActInvocation),
    Extract(String),
    Observe(String),
    GoBack,
    CurrentUrl,
    Screenshot,
    Close,
}

/// Engine whose responses are programmed ahead of time.
pub struct ScriptedEngine {
    session: SessionId,
    observations: Mutex<VecDeque<Vec<ActionDescriptor>>>,
    extractions: Mutex<VecDeque<Value>>,
    calls: Mutex<Vec<EngineCall>>,
    current_url: Mutex<String>,
    back_stack: Mutex<Vec<String>>,
    closed: AtomicBool,
    fail_init: bool,
    live_view: Option<String>,
    screenshot: Vec<u8>,
}

impl ScriptedEngine {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            observations: Mutex::new(VecDeque::new()),
            extractions: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            current_url: Mutex::new("about:blank".to_string()),
            back_stack: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_init: false,
            live_view: None,
            screenshot: b"scripted-screenshot".to_vec(),
        }
    }

    /// Queue the result of the next `observe` call.
    pub fn with_observation(self, actions: Vec<ActionDescriptor>) -> Self {
        self.observations.lock().push_back(actions);
        self
    }

    /// Queue the result of the next `extract` call.
    pub fn with_extraction(self, payload: Value) -> Self {
        self.extractions.lock().push_back(payload);
        self
    }

    pub fn with_live_view(mut self, url: impl Into<String>) -> Self {
        self.live_view = Some(url.into());
        self
    }

    /// Make `init` fail, for exercising session-bring-up error paths.
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Everything dispatched so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_closed() {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrowserEngine for ScriptedEngine {
    async fn init(&self) -> Result<(), EngineError> {
        self.record(EngineCall::Init);
        if self.fail_init {
            return Err(EngineError::init("scripted init failure"));
        }
        Ok(())
    }

    async fn goto_url(&self, url: &str, _timeout: Duration) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.record(EngineCall::Goto(url.to_string()));
        let mut current = self.current_url.lock();
        self.back_stack.lock().push(current.clone());
        *current = url.to_string();
        Ok(())
    }

    async fn perform_action(&self, invocation: &ActInvocation) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.record(EngineCall::Act(invocation.clone()));
        Ok(())
    }

    async fn extract(&self, instruction: &str) -> Result<Value, EngineError> {
        self.ensure_open()?;
        self.record(EngineCall::Extract(instruction.to_string()));
        Ok(self.extractions.lock().pop_front().unwrap_or(Value::Null))
    }

    async fn observe(&self, instruction: &str) -> Result<Vec<ActionDescriptor>, EngineError> {
        self.ensure_open()?;
        self.record(EngineCall::Observe(instruction.to_string()));
        Ok(self.observations.lock().pop_front().unwrap_or_default())
    }

    async fn go_back(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.record(EngineCall::GoBack);
        if let Some(previous) = self.back_stack.lock().pop() {
            *self.current_url.lock() = previous;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        self.ensure_open()?;
        self.record(EngineCall::CurrentUrl);
        Ok(self.current_url.lock().clone())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, EngineError> {
        self.ensure_open()?;
        self.record(EngineCall::Screenshot);
        Ok(self.screenshot.clone())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.record(EngineCall::Close);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn live_view_url(&self) -> Option<String> {
        self.live_view.clone()
    }
}

/// Factory handing out scripted engines, with optional per-session
/// prepared instances.
#[derive(Default)]
pub struct ScriptedEngineFactory {
    prepared: Mutex<HashMap<SessionId, Arc<ScriptedEngine>>>,
}

impl ScriptedEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the engine to hand out for a specific session id.
    pub fn prepare(&self, session: SessionId, engine: Arc<ScriptedEngine>) {
        self.prepared.lock().insert(session, engine);
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(&self, session: &SessionId) -> Result<Arc<dyn BrowserEngine>, EngineError> {
        if let Some(engine) = self.prepared.lock().get(session) {
            return Ok(Arc::clone(engine) as Arc<dyn BrowserEngine>);
        }
        Ok(Arc::new(ScriptedEngine::new(session.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_pops_scripted_results() {
        let engine = ScriptedEngine::new(SessionId::from("s"))
            .with_observation(vec![ActionDescriptor::new("Click", "click", "#a", "")]);

        engine.init().await.unwrap();
        engine
            .goto_url("https://example.com", Duration::from_secs(1))
            .await
            .unwrap();
        let first = engine.observe("links").await.unwrap();
        let second = engine.observe("links").await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(engine.calls().len(), 4);
        assert_eq!(engine.current_url().await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn go_back_restores_previous_url() {
        let engine = ScriptedEngine::new(SessionId::from("s"));
        engine
            .goto_url("https://a.example", Duration::from_secs(1))
            .await
            .unwrap();
        engine
            .goto_url("https://b.example", Duration::from_secs(1))
            .await
            .unwrap();
        engine.go_back().await.unwrap();
        assert_eq!(engine.current_url().await.unwrap(), "https://a.example");
    }

    #[tokio::test]
    async fn closed_engine_rejects_further_work() {
        let engine = ScriptedEngine::new(SessionId::from("s"));
        engine.close().await.unwrap();
        let err = engine.observe("anything").await.unwrap_err();
        assert!(matches!(err, EngineError::Closed));
    }
}
