//! OpenAI-compatible chat-completions adapter for the reasoning contract.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use webpilot_agent::{AgentError, CompletionRequest, ReasoningProvider};

/// Reasoning provider backed by any OpenAI-compatible chat-completions
/// endpoint. The response schema is embedded in the system prompt and the
/// reply is requested as a JSON object.
pub struct OpenAiReasoner {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiReasoner {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let system = format!(
            "{}\n\nRespond with a single JSON object matching this JSON schema, and nothing else:\n{}",
            request.system, request.schema
        );
        let mut user_content = vec![json!({ "type": "text", "text": request.user })];
        if let Some(image) = &request.screenshot_base64 {
            user_content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{image}") },
            }));
        }
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user_content },
            ],
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
        })
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiReasoner {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, AgentError> {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|err| AgentError::planning(format!("reasoning service unreachable: {err}")))?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|err| {
            AgentError::planning(format!("reasoning service reply was not JSON: {err}"))
        })?;
        if !status.is_success() {
            let detail = payload["error"]["message"].as_str().unwrap_or("unknown error");
            return Err(AgentError::planning(format!(
                "reasoning service returned {status}: {detail}"
            )));
        }
        debug!(model = %self.model, "reasoning reply received");
        extract_content(&payload)
    }
}

/// Pull the structured JSON out of a chat-completions reply.
fn extract_content(payload: &Value) -> Result<Value, AgentError> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| AgentError::planning("reasoning reply carried no content"))?;
    let cleaned = strip_fences(content);
    serde_json::from_str(cleaned)
        .map_err(|err| AgentError::planning(format!("reasoning reply was not valid JSON: {err}")))
}

/// Models occasionally wrap JSON in markdown fences despite instructions.
fn strip_fences(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with(content: &str) -> Value {
        json!({
            "choices": [
                { "message": { "role": "assistant", "content": content } }
            ]
        })
    }

    #[test]
    fn extracts_plain_json_content() {
        let payload = reply_with(r#"{"tool": "COMPLETE", "text": "done"}"#);
        let value = extract_content(&payload).unwrap();
        assert_eq!(value["tool"], "COMPLETE");
    }

    #[test]
    fn strips_markdown_fences() {
        let payload = reply_with("```json\n{\"url\": \"https://example.com\"}\n```");
        let value = extract_content(&payload).unwrap();
        assert_eq!(value["url"], "https://example.com");
    }

    #[test]
    fn missing_content_is_a_planning_failure() {
        let err = extract_content(&json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, AgentError::Planning(_)));
    }

    #[test]
    fn non_json_content_is_a_planning_failure() {
        let err = extract_content(&reply_with("I couldn't decide, sorry!")).unwrap_err();
        assert!(matches!(err, AgentError::Planning(_)));
    }
}
