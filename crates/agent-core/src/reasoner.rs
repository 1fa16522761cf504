use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::errors::AgentError;

/// One completion request against the reasoning service.
///
/// The service sees a system prompt, a user prompt, optionally a screenshot
/// for visual grounding, and the JSON schema its reply must satisfy.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub screenshot_base64: Option<String>,
    pub schema: Value,
}

/// Abstraction over the LLM-backed decision service consulted by the
/// planner, so multiple vendors can plug into the agent core.
///
/// Implementations return the raw JSON value; schema validation happens in
/// the planner so every provider is held to the same contract.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, AgentError>;
}

/// Deterministic provider used for tests and offline demos: replies with a
/// programmed sequence of completions, in order.
#[derive(Default)]
pub struct ScriptedReasoner {
    responses: Mutex<VecDeque<Value>>,
}

impl ScriptedReasoner {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    pub async fn push(&self, response: Value) {
        self.responses.lock().await.push_back(response);
    }
}

#[async_trait]
impl ReasoningProvider for ScriptedReasoner {
    async fn complete(&self, _request: &CompletionRequest) -> Result<Value, AgentError> {
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| AgentError::planning("scripted reasoner has no responses left"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "system".to_string(),
            user: "user".to_string(),
            screenshot_base64: None,
            schema: json!({}),
        }
    }

    #[tokio::test]
    async fn scripted_reasoner_replays_in_order() {
        let reasoner = ScriptedReasoner::new(vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(reasoner.complete(&request()).await.unwrap(), json!({"a": 1}));
        assert_eq!(reasoner.complete(&request()).await.unwrap(), json!({"b": 2}));
        assert!(matches!(
            reasoner.complete(&request()).await,
            Err(AgentError::Planning(_))
        ));
    }
}
