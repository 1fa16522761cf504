use std::sync::Arc;

use webpilot_agent::AgentLoop;

/// Shared state for the serve-mode router.
#[derive(Clone)]
pub struct ServeState {
    agent: Arc<AgentLoop>,
}

impl ServeState {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Arc<AgentLoop> {
        &self.agent
    }
}
