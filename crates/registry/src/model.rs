use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use webpilot_core_types::SessionId;
use webpilot_engine::BrowserEngine;

/// A live browser session as tracked by the registry.
///
/// The handle outlives individual runs; it is only torn down by
/// [`SessionRegistry::release`](crate::SessionRegistry::release).
pub struct SessionHandle {
    id: SessionId,
    engine: Arc<dyn BrowserEngine>,
    created_at: DateTime<Utc>,
    live_view_url: Option<String>,
    exec_lock: Mutex<()>,
    terminated: CancellationToken,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("live_view_url", &self.live_view_url)
            .finish()
    }
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, engine: Arc<dyn BrowserEngine>) -> Self {
        let live_view_url = engine.live_view_url();
        Self {
            id,
            engine,
            created_at: Utc::now(),
            live_view_url,
            exec_lock: Mutex::new(()),
            terminated: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn engine(&self) -> &Arc<dyn BrowserEngine> {
        &self.engine
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Human-viewable debug URL, when the engine backend exposes one.
    pub fn live_view_url(&self) -> Option<&str> {
        self.live_view_url.as_deref()
    }

    /// Serializes executor calls against this session. Held for the
    /// duration of each executed step; `release` also takes it so teardown
    /// waits for in-flight work instead of closing under it.
    pub async fn lock_execution(&self) -> MutexGuard<'_, ()> {
        self.exec_lock.lock().await
    }

    pub(crate) fn terminate_token(&self) -> &CancellationToken {
        &self.terminated
    }

    /// Whether the session has been released.
    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }
}
