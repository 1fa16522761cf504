//! Configuration for the agent loop.

use serde::{Deserialize, Serialize};

/// Tunables for one orchestrator instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    /// Maximum steps per run before the loop gives up. The planner choosing
    /// a terminal step is the only natural exit, so this cap is what keeps
    /// a poorly grounded goal from looping forever.
    /// Default: 50
    pub max_steps: u32,

    /// Timeout for navigation commits in milliseconds.
    /// Default: 60000
    pub navigate_timeout_ms: u64,

    /// Timeout for UI actions in milliseconds.
    /// Default: 60000
    pub act_timeout_ms: u64,

    /// Whether to capture a screenshot before each planning call so the
    /// reasoning service sees the page.
    /// Default: true
    pub capture_screenshots: bool,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            navigate_timeout_ms: 60_000,
            act_timeout_ms: 60_000,
            capture_screenshots: true,
        }
    }
}

impl AgentLoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Small bounds for tests.
    pub fn minimal() -> Self {
        Self {
            max_steps: 8,
            navigate_timeout_ms: 2_000,
            act_timeout_ms: 2_000,
            capture_screenshots: false,
        }
    }

    /// Builder: set the step cap.
    pub fn max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Builder: set the navigation timeout.
    pub fn navigate_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.navigate_timeout_ms = timeout_ms;
        self
    }

    /// Builder: set the action timeout.
    pub fn act_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.act_timeout_ms = timeout_ms;
        self
    }

    /// Builder: toggle screenshot grounding.
    pub fn screenshots(mut self, enabled: bool) -> Self {
        self.capture_screenshots = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let config = AgentLoopConfig::default();
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.navigate_timeout_ms, 60_000);
        assert!(config.capture_screenshots);
    }

    #[test]
    fn builder_overrides() {
        let config = AgentLoopConfig::new().max_steps(3).screenshots(false);
        assert_eq!(config.max_steps, 3);
        assert!(!config.capture_screenshots);
    }
}
