//! Step planning against the reasoning service.
//!
//! The planner is a pure decision function of (goal, history, visual
//! state): it never touches the browser itself, which keeps it testable
//! against scripted reasoning responses.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use webpilot_core_types::{MessageEvent, MessageRole, Step, StepAction, StepTool};

use crate::errors::AgentError;
use crate::reasoner::{CompletionRequest, ReasoningProvider};

const STARTING_POINT_SYSTEM: &str = r#"You pick the starting web page for a browsing task.

Acceptable starting points:
- A search engine, when the goal does not name or imply a specific site.
- A direct URL, when the goal names a site or you know the canonical one.
- Any other page you judge to be the best entry point.

The url field must be a complete, syntactically valid URL."#;

const NEXT_STEP_SYSTEM: &str = r#"You drive a web browser one step at a time toward the user's goal.

Pick exactly one next step using one of these tools:
- NAVIGATE: load a page; instruction is the URL.
- ACT: perform one UI action; instruction is a natural-language directive.
  Set use_structured_action true only when replaying a previously observed
  action, with that action serialized as the instruction.
- EXTRACT: pull data off the current page; instruction says what to extract.
- OBSERVE: list candidate actions on the current page; instruction says what
  to look for. Set wait_for_user_choice true when a human should pick one of
  the results before the task continues.
- WAIT: pause; instruction is a millisecond count.
- NAVIGATE_BACK: go back one page; instruction is ignored.
- COMPLETE: the goal is accomplished or cannot be; text carries the final
  summary for the user.

Ground every decision in the step history and the current page. Do not
repeat steps that already succeeded."#;

const FOLLOW_UP_SYSTEM: &str = r#"The user has a follow-up request for a browser session that already served
earlier tasks. The conversation so far is provided for context; the browser
is still on its last page.

Pick exactly one next step, using the same tools and reply shape as always:
NAVIGATE, ACT, EXTRACT, OBSERVE, WAIT, NAVIGATE_BACK or COMPLETE. If the
conversation already contains everything needed to answer, reply with
COMPLETE and put the answer in text."#;

const MAX_RESULT_CHARS: usize = 600;

/// Outcome of the initial "where do we start" decision.
#[derive(Clone, Debug)]
pub struct StartingPoint {
    pub url: Url,
    pub reasoning: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct StartingPointResponse {
    url: String,
    reasoning: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PlannedStepResponse {
    text: String,
    reasoning: String,
    tool: String,
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    use_structured_action: bool,
    #[serde(default)]
    wait_for_user_choice: bool,
}

fn schema_of<T: JsonSchema>() -> Value {
    let schema = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T>();
    serde_json::to_value(schema).unwrap_or_default()
}

/// Produces exactly one next step per consultation.
pub struct StepPlanner {
    provider: Arc<dyn ReasoningProvider>,
}

impl StepPlanner {
    pub fn new(provider: Arc<dyn ReasoningProvider>) -> Self {
        Self { provider }
    }

    /// Decide where a fresh task should begin browsing.
    pub async fn choose_starting_point(&self, goal: &str) -> Result<StartingPoint, AgentError> {
        let request = CompletionRequest {
            system: STARTING_POINT_SYSTEM.to_string(),
            user: format!("Goal: {goal}\n\nWhere should the browser start?"),
            screenshot_base64: None,
            schema: schema_of::<StartingPointResponse>(),
        };
        let value = self.provider.complete(&request).await?;
        let response: StartingPointResponse = serde_json::from_value(value).map_err(|err| {
            AgentError::planning(format!("starting point reply violated the schema: {err}"))
        })?;
        let url = Url::parse(response.url.trim()).map_err(|err| {
            AgentError::planning(format!(
                "starting point url '{}' is not a valid URL: {err}",
                response.url
            ))
        })?;
        debug!(%url, "starting point chosen");
        Ok(StartingPoint {
            url,
            reasoning: response.reasoning,
        })
    }

    /// Decide the next step given the full prior history and a fresh look
    /// at the page.
    pub async fn plan_next(
        &self,
        goal: &str,
        current_url: &str,
        screenshot_base64: Option<String>,
        history: &[Step],
    ) -> Result<Step, AgentError> {
        let user = format!(
            "Goal: {goal}\n\nCurrent page: {current_url}\n\nSteps taken so far:\n{}",
            render_history(history)
        );
        let request = CompletionRequest {
            system: NEXT_STEP_SYSTEM.to_string(),
            user,
            screenshot_base64,
            schema: schema_of::<PlannedStepResponse>(),
        };
        let value = self.provider.complete(&request).await?;
        let step_number = history.len() as u32 + 1;
        parse_planned_step(value, step_number)
    }

    /// Decide the first step of a follow-up task, seeded from the
    /// conversation transcript instead of a structured history. Step
    /// numbering restarts at 1.
    pub async fn plan_follow_up(
        &self,
        goal: &str,
        prior_messages: &[MessageEvent],
    ) -> Result<Step, AgentError> {
        let user = format!(
            "Conversation so far:\n{}\n\nFollow-up request: {goal}",
            render_transcript(prior_messages)
        );
        let request = CompletionRequest {
            system: FOLLOW_UP_SYSTEM.to_string(),
            user,
            screenshot_base64: None,
            schema: schema_of::<PlannedStepResponse>(),
        };
        let value = self.provider.complete(&request).await?;
        parse_planned_step(value, 1)
    }
}

fn parse_planned_step(value: Value, step_number: u32) -> Result<Step, AgentError> {
    let response: PlannedStepResponse = serde_json::from_value(value).map_err(|err| {
        AgentError::planning(format!("planned step reply violated the schema: {err}"))
    })?;
    let tool = StepTool::parse(&response.tool)
        .map_err(|err| AgentError::planning(format!("planned step: {err}")))?;
    let action = StepAction::from_parts(
        tool,
        &response.instruction,
        response.use_structured_action,
        response.wait_for_user_choice,
    )
    .map_err(|err| AgentError::planning(format!("planned step: {err}")))?;
    Ok(Step::new(
        step_number,
        response.text,
        response.reasoning,
        action,
    ))
}

fn render_history(history: &[Step]) -> String {
    if history.is_empty() {
        return "(none yet)".to_string();
    }
    let mut lines = Vec::with_capacity(history.len());
    for step in history {
        let mut line = format!(
            "{}. [{}] {} -- {}",
            step.step_number,
            step.tool(),
            step.text,
            step.reasoning
        );
        let instruction = step.action.instruction_text();
        if !instruction.is_empty() {
            line.push_str(&format!("\n   instruction: {instruction}"));
        }
        if let Some(observation) = &step.observation {
            let described: Vec<&str> = observation
                .iter()
                .map(|action| action.description.as_str())
                .collect();
            line.push_str(&format!(
                "\n   observed {} candidate action(s): {}",
                observation.len(),
                truncate(&described.join("; "), MAX_RESULT_CHARS)
            ));
        }
        if let Some(extraction) = &step.extraction {
            line.push_str(&format!(
                "\n   extracted: {}",
                truncate(&extraction.to_string(), MAX_RESULT_CHARS)
            ));
        }
        lines.push(line);
    }
    lines.join("\n")
}

fn render_transcript(messages: &[MessageEvent]) -> String {
    if messages.is_empty() {
        return "(empty)".to_string();
    }
    messages
        .iter()
        .map(|message| {
            let speaker = match message.role {
                MessageRole::User => "user",
                MessageRole::Agent => "agent",
            };
            format!("[{speaker}] {}", truncate(&message.text, MAX_RESULT_CHARS))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars).collect();
    clipped.push('…');
    clipped
}
