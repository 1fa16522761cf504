use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use webpilot_core_types::SessionId;
use webpilot_engine::EngineFactory;

use crate::{errors::RegistryError, model::SessionHandle};

/// Per-id slot. The init mutex serializes concurrent acquires and releases
/// of the same id so an engine is never double-initialized or closed while
/// it is still being brought up.
#[derive(Default)]
struct Slot {
    init: Mutex<()>,
    handle: RwLock<Option<Arc<SessionHandle>>>,
}

/// Process-wide map from session id to live browser handle.
///
/// The map is the only state shared across runs; everything else belongs to
/// a single orchestration run.
pub struct SessionRegistry {
    factory: Arc<dyn EngineFactory>,
    sessions: DashMap<SessionId, Arc<Slot>>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            sessions: DashMap::new(),
        }
    }

    /// Return the live handle for `id`, constructing and initializing one
    /// on first use.
    ///
    /// Initialization failure evicts the entry so no half-registered
    /// session survives; the error is surfaced, not retried.
    pub async fn acquire(&self, id: &SessionId) -> Result<Arc<SessionHandle>, RegistryError> {
        loop {
            let slot = {
                let entry = self
                    .sessions
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(Slot::default()));
                Arc::clone(entry.value())
            };
            let _init = slot.init.lock().await;

            // The slot may have been evicted between lookup and lock; start
            // over so we never initialize into a detached slot.
            let still_current = self
                .sessions
                .get(id)
                .map(|current| Arc::ptr_eq(current.value(), &slot))
                .unwrap_or(false);
            if !still_current {
                continue;
            }

            if let Some(handle) = slot.handle.read().clone() {
                return Ok(handle);
            }

            let engine = match self.factory.create(id) {
                Ok(engine) => engine,
                Err(err) => {
                    self.sessions.remove_if(id, |_, s| Arc::ptr_eq(s, &slot));
                    return Err(RegistryError::init(err));
                }
            };
            if let Err(err) = engine.init().await {
                self.sessions.remove_if(id, |_, s| Arc::ptr_eq(s, &slot));
                return Err(RegistryError::init(err));
            }

            let handle = Arc::new(SessionHandle::new(id.clone(), engine));
            *slot.handle.write() = Some(Arc::clone(&handle));
            info!(session = %id, "session registered");
            return Ok(handle);
        }
    }

    /// Live handle for `id`, if one exists. Never constructs.
    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions
            .get(id)
            .and_then(|slot| slot.handle.read().clone())
    }

    /// Tear down the session for `id`: best-effort final screenshot, close,
    /// evict. Idempotent; releasing an unknown id returns `None`.
    ///
    /// Waits for any in-flight executed step before closing, so a handle is
    /// never closed out from under the executor.
    pub async fn release(&self, id: &SessionId) -> Option<Vec<u8>> {
        let (_, slot) = self.sessions.remove(id)?;
        let _init = slot.init.lock().await;
        let handle = slot.handle.write().take()?;

        handle.terminate_token().cancel();
        let _exec = handle.lock_execution().await;

        let screenshot = match handle.engine().capture_screenshot().await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(session = %id, %err, "final screenshot capture failed");
                None
            }
        };
        if let Err(err) = handle.engine().close().await {
            warn!(session = %id, %err, "engine close failed");
        }
        debug!(session = %id, "session released");
        screenshot
    }

    /// Whether a live handle is registered for `id`.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions
            .get(id)
            .map(|slot| slot.handle.read().is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webpilot_engine::{ScriptedEngine, ScriptedEngineFactory};

    fn registry_with(factory: ScriptedEngineFactory) -> SessionRegistry {
        SessionRegistry::new(Arc::new(factory))
    }

    #[tokio::test]
    async fn acquire_reuses_the_same_handle() {
        let registry = registry_with(ScriptedEngineFactory::new());
        let id = SessionId::from("alpha");

        let first = registry.acquire(&id).await.unwrap();
        let second = registry.acquire(&id).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_acquires_initialize_once() {
        let factory = ScriptedEngineFactory::new();
        let id = SessionId::from("alpha");
        let engine = Arc::new(ScriptedEngine::new(id.clone()));
        factory.prepare(id.clone(), Arc::clone(&engine));

        let registry = registry_with(factory);
        let (a, b) = tokio::join!(registry.acquire(&id), registry.acquire(&id));
        a.unwrap();
        b.unwrap();

        let inits = engine
            .calls()
            .iter()
            .filter(|call| matches!(call, webpilot_engine::EngineCall::Init))
            .count();
        assert_eq!(inits, 1);
    }

    #[tokio::test]
    async fn failed_init_evicts_the_entry() {
        let factory = ScriptedEngineFactory::new();
        let id = SessionId::from("broken");
        factory.prepare(
            id.clone(),
            Arc::new(ScriptedEngine::new(id.clone()).failing_init()),
        );
        let registry = registry_with(factory);

        let err = registry.acquire(&id).await.unwrap_err();
        assert!(matches!(err, RegistryError::Init(_)));
        assert!(!registry.contains(&id));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn release_is_idempotent_and_best_effort() {
        let factory = ScriptedEngineFactory::new();
        let id = SessionId::from("alpha");
        let engine = Arc::new(ScriptedEngine::new(id.clone()));
        factory.prepare(id.clone(), Arc::clone(&engine));
        let registry = registry_with(factory);

        registry.acquire(&id).await.unwrap();
        let screenshot = registry.release(&id).await;
        assert!(screenshot.is_some());
        assert!(engine.is_closed());

        // Second release is a no-op success.
        assert!(registry.release(&id).await.is_none());
        assert!(!registry.contains(&id));
    }

    #[tokio::test]
    async fn release_marks_the_handle_terminated() {
        let registry = registry_with(ScriptedEngineFactory::new());
        let id = SessionId::from("alpha");
        let handle = registry.acquire(&id).await.unwrap();

        assert!(!handle.is_terminated());
        registry.release(&id).await;
        assert!(handle.is_terminated());
    }
}
