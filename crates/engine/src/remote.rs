//! Engine adapter speaking JSON over HTTP to a remote automation service.
//!
//! The service owns the actual browsers; this adapter maps the engine
//! contract onto its session-scoped endpoints and normalizes transport
//! failures into [`EngineError`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use webpilot_core_types::{ActionDescriptor, SessionId};

use crate::{ActInvocation, BrowserEngine, EngineError, EngineFactory};

#[derive(Debug, Deserialize)]
struct InitResponse {
    #[serde(default)]
    live_view_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UrlResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ScreenshotResponse {
    data: String,
}

#[derive(Debug, Deserialize)]
struct ObserveResponse {
    #[serde(default)]
    actions: Vec<ActionDescriptor>,
}

/// Remote browser session bound to one session id.
pub struct RemoteEngine {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    session: SessionId,
    live_view: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl RemoteEngine {
    pub fn new(http: Client, base_url: Url, api_key: Option<String>, session: SessionId) -> Self {
        Self {
            http,
            base_url,
            api_key,
            session,
            live_view: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn endpoint(&self, tail: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        if tail.is_empty() {
            format!("{base}/v1/sessions/{}", self.session)
        } else {
            format!("{base}/v1/sessions/{}/{tail}", self.session)
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        operation: &str,
    ) -> Result<reqwest::Response, EngineError> {
        let response = self.authorized(builder).send().await.map_err(|err| {
            if err.is_timeout() {
                EngineError::timeout(operation, 0)
            } else {
                EngineError::protocol(format!("{operation}: {err}"))
            }
        })?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::protocol(format!(
            "{operation} returned {status}: {body}"
        )))
    }
}

#[async_trait]
impl BrowserEngine for RemoteEngine {
    async fn init(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        let response = self
            .authorized(self.http.post(self.endpoint("init")))
            .send()
            .await
            .map_err(|err| EngineError::init(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::init(format!("{status}: {body}")));
        }
        let parsed: InitResponse = response
            .json()
            .await
            .map_err(|err| EngineError::init(err.to_string()))?;
        debug!(session = %self.session, live_view = ?parsed.live_view_url, "remote session ready");
        *self.live_view.lock() = parsed.live_view_url;
        Ok(())
    }

    async fn goto_url(&self, url: &str, timeout: Duration) -> Result<(), EngineError> {
        self.ensure_open()?;
        let builder = self
            .http
            .post(self.endpoint("navigate"))
            .json(&json!({ "url": url, "timeout_ms": timeout.as_millis() as u64 }))
            .timeout(timeout + Duration::from_secs(5));
        self.send(builder, "navigate")
            .await
            .map_err(|err| match err {
                EngineError::Timeout { .. } => {
                    EngineError::timeout("navigate", timeout.as_millis() as u64)
                }
                EngineError::Protocol(message) => EngineError::navigation(message),
                other => other,
            })?;
        Ok(())
    }

    async fn perform_action(&self, invocation: &ActInvocation) -> Result<(), EngineError> {
        self.ensure_open()?;
        let body = match invocation {
            ActInvocation::Freeform(instruction) => json!({ "instruction": instruction }),
            ActInvocation::Structured(descriptor) => json!({ "action": descriptor }),
        };
        let builder = self.http.post(self.endpoint("act")).json(&body);
        self.send(builder, "act").await.map_err(|err| match err {
            EngineError::Protocol(message) => EngineError::action(message),
            other => other,
        })?;
        Ok(())
    }

    async fn extract(&self, instruction: &str) -> Result<Value, EngineError> {
        self.ensure_open()?;
        let builder = self
            .http
            .post(self.endpoint("extract"))
            .json(&json!({ "instruction": instruction }));
        let response = self.send(builder, "extract").await?;
        response
            .json()
            .await
            .map_err(|err| EngineError::protocol(format!("extract payload: {err}")))
    }

    async fn observe(&self, instruction: &str) -> Result<Vec<ActionDescriptor>, EngineError> {
        self.ensure_open()?;
        let builder = self
            .http
            .post(self.endpoint("observe"))
            .json(&json!({ "instruction": instruction }));
        let response = self.send(builder, "observe").await?;
        let parsed: ObserveResponse = response
            .json()
            .await
            .map_err(|err| EngineError::protocol(format!("observe payload: {err}")))?;
        Ok(parsed.actions)
    }

    async fn go_back(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.send(self.http.post(self.endpoint("back")), "back")
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        self.ensure_open()?;
        let response = self.send(self.http.get(self.endpoint("url")), "url").await?;
        let parsed: UrlResponse = response
            .json()
            .await
            .map_err(|err| EngineError::protocol(format!("url payload: {err}")))?;
        Ok(parsed.url)
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, EngineError> {
        self.ensure_open()?;
        let response = self
            .send(self.http.get(self.endpoint("screenshot")), "screenshot")
            .await?;
        let parsed: ScreenshotResponse = response
            .json()
            .await
            .map_err(|err| EngineError::protocol(format!("screenshot payload: {err}")))?;
        BASE64
            .decode(parsed.data.as_bytes())
            .map_err(|err| EngineError::protocol(format!("screenshot encoding: {err}")))
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.send(self.http.delete(self.endpoint("")), "close")
            .await?;
        Ok(())
    }

    fn live_view_url(&self) -> Option<String> {
        self.live_view.lock().clone()
    }
}

/// Builds [`RemoteEngine`]s sharing one HTTP client and credentials.
pub struct RemoteEngineFactory {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl RemoteEngineFactory {
    pub fn new(base_url: Url, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key,
        }
    }
}

impl EngineFactory for RemoteEngineFactory {
    fn create(&self, session: &SessionId) -> Result<Arc<dyn BrowserEngine>, EngineError> {
        Ok(Arc::new(RemoteEngine::new(
            self.http.clone(),
            self.base_url.clone(),
            self.api_key.clone(),
            session.clone(),
        )))
    }
}
