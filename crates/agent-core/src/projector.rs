//! Projection of internal step records into presentation-layer events.
//!
//! These are pure mappings; the orchestrator emits the results over an
//! optional channel and also collects them into the run report.

use serde_json::json;

use webpilot_core_types::{MessageEvent, Step, StepTool};

use crate::agent_loop::RunStatus;

/// Event for a user-issued goal.
pub fn goal_event(goal: &str) -> MessageEvent {
    MessageEvent::user(goal)
}

/// Event for one completed step, result payloads serialized opaquely.
pub fn step_event(step: &Step) -> MessageEvent {
    let mut event = MessageEvent::agent(step.text.clone())
        .with_reasoning(step.reasoning.clone())
        .with_tool(step.tool())
        .with_step_number(step.step_number);
    if let Some(observation) = &step.observation {
        event = event.with_payload(json!({ "observation": observation }));
    } else if let Some(extraction) = &step.extraction {
        event = event.with_payload(json!({ "extraction": extraction }));
    }
    event
}

/// Closing event summarizing how the run ended.
pub fn outcome_event(status: RunStatus, summary: &str) -> MessageEvent {
    let text = match status {
        RunStatus::Complete => summary.to_string(),
        RunStatus::Suspended => format!("Awaiting your choice: {summary}"),
        RunStatus::Failed => format!("Task failed: {summary}"),
    };
    MessageEvent::agent(text).with_tool(StepTool::Complete)
}
