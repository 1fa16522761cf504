//! Shared vocabulary for the WebPilot agent crates.
//!
//! Everything here is plain data: identifiers, the step model the planner
//! and executor exchange, candidate actions surfaced by observation, and the
//! message events handed to presentation layers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while building or parsing model values.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Raised when a tool name is outside the closed enumeration.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// Raised when a step instruction cannot be interpreted for its tool.
    #[error("invalid instruction for {tool}: {reason}")]
    InvalidInstruction { tool: StepTool, reason: String },

    /// Raised when a serialized action descriptor fails to parse.
    #[error("malformed action descriptor: {0}")]
    MalformedDescriptor(String),
}

/// Identifier of one live browser-automation session.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Identifier of one submitted task (initial goal or follow-up).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of operations a planned step may perform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTool {
    Navigate,
    Act,
    Extract,
    Observe,
    Wait,
    NavigateBack,
    Complete,
}

impl StepTool {
    /// Parse a wire-level tool name.
    ///
    /// Accepts the legacy synonyms `GOTO` (navigate), `NAVBACK`
    /// (navigate_back) and `CLOSE` (complete) that older planner prompts
    /// emitted, case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NAVIGATE" | "GOTO" => Ok(Self::Navigate),
            "ACT" => Ok(Self::Act),
            "EXTRACT" => Ok(Self::Extract),
            "OBSERVE" => Ok(Self::Observe),
            "WAIT" => Ok(Self::Wait),
            "NAVIGATE_BACK" | "NAVBACK" => Ok(Self::NavigateBack),
            "COMPLETE" | "CLOSE" => Ok(Self::Complete),
            other => Err(ModelError::UnknownTool(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "NAVIGATE",
            Self::Act => "ACT",
            Self::Extract => "EXTRACT",
            Self::Observe => "OBSERVE",
            Self::Wait => "WAIT",
            Self::NavigateBack => "NAVIGATE_BACK",
            Self::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for StepTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate interactable action surfaced by an OBSERVE step.
///
/// Produced only by the automation engine; the planner treats it as opaque
/// apart from the description, which is shown to a human chooser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Human-readable description of what the action does.
    pub description: String,
    /// Action verb understood by the engine (e.g. "click", "fill").
    pub method: String,
    /// Target-element selector.
    pub selector: String,
    /// Arguments for the verb; the first is always present.
    pub arguments: Vec<String>,
}

impl ActionDescriptor {
    pub fn new(
        description: impl Into<String>,
        method: impl Into<String>,
        selector: impl Into<String>,
        first_argument: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            method: method.into(),
            selector: selector.into(),
            arguments: vec![first_argument.into()],
        }
    }

    /// Append a variadic argument.
    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Parse a serialized descriptor, as carried by structured ACT steps.
    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        let descriptor: Self = serde_json::from_str(raw)
            .map_err(|err| ModelError::MalformedDescriptor(err.to_string()))?;
        if descriptor.arguments.is_empty() {
            return Err(ModelError::MalformedDescriptor(
                "descriptor carries no arguments".to_string(),
            ));
        }
        Ok(descriptor)
    }
}

/// Tool-specific payload of a planned step.
///
/// Modeled as a sum type so each variant carries only the fields that are
/// meaningful for its tool; ACT's structured-instruction flag and OBSERVE's
/// user-choice flag cannot be confused with each other.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum StepAction {
    /// Load a URL, waiting for the navigation to commit.
    Navigate { url: String },
    /// Perform one UI action. When `use_structured_action` is set the
    /// instruction is a serialized [`ActionDescriptor`] replayed verbatim;
    /// otherwise it is a natural-language directive for the engine.
    Act {
        instruction: String,
        use_structured_action: bool,
    },
    /// Extract structured data per the natural-language instruction.
    Extract { instruction: String },
    /// Enumerate candidate actions matching the instruction. When
    /// `wait_for_user_choice` is set the loop suspends so a human can pick
    /// one of the returned candidates.
    Observe {
        instruction: String,
        wait_for_user_choice: bool,
    },
    /// Pause this step for the given number of milliseconds.
    Wait { duration_ms: u64 },
    /// Pop one entry of browser history.
    NavigateBack,
    /// Terminal step; no browser side effect.
    Complete,
}

impl StepAction {
    /// Build an action from wire-level parts as returned by a planner.
    ///
    /// `instruction` is interpreted according to the tool; the two boolean
    /// flags are only consulted for the tools they belong to.
    pub fn from_parts(
        tool: StepTool,
        instruction: &str,
        use_structured_action: bool,
        wait_for_user_choice: bool,
    ) -> Result<Self, ModelError> {
        let action = match tool {
            StepTool::Navigate => Self::Navigate {
                url: instruction.trim().to_string(),
            },
            StepTool::Act => Self::Act {
                instruction: instruction.to_string(),
                use_structured_action,
            },
            StepTool::Extract => Self::Extract {
                instruction: instruction.to_string(),
            },
            StepTool::Observe => Self::Observe {
                instruction: instruction.to_string(),
                wait_for_user_choice,
            },
            StepTool::Wait => {
                let duration_ms = instruction.trim().parse::<u64>().map_err(|_| {
                    ModelError::InvalidInstruction {
                        tool: StepTool::Wait,
                        reason: format!("'{instruction}' is not a millisecond count"),
                    }
                })?;
                Self::Wait { duration_ms }
            }
            StepTool::NavigateBack => Self::NavigateBack,
            StepTool::Complete => Self::Complete,
        };
        Ok(action)
    }

    /// The tool this action belongs to.
    pub fn tool(&self) -> StepTool {
        match self {
            Self::Navigate { .. } => StepTool::Navigate,
            Self::Act { .. } => StepTool::Act,
            Self::Extract { .. } => StepTool::Extract,
            Self::Observe { .. } => StepTool::Observe,
            Self::Wait { .. } => StepTool::Wait,
            Self::NavigateBack => StepTool::NavigateBack,
            Self::Complete => StepTool::Complete,
        }
    }

    /// Instruction text as shown in history renderings.
    pub fn instruction_text(&self) -> String {
        match self {
            Self::Navigate { url } => url.clone(),
            Self::Act { instruction, .. }
            | Self::Extract { instruction }
            | Self::Observe { instruction, .. } => instruction.clone(),
            Self::Wait { duration_ms } => duration_ms.to_string(),
            Self::NavigateBack | Self::Complete => String::new(),
        }
    }
}

/// One planner-selected, executor-performed unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position within the current run; restarts at 1 when a
    /// follow-up task begins on the same session.
    pub step_number: u32,

    /// Human-readable description of the step.
    pub text: String,

    /// Planner's justification for choosing it.
    pub reasoning: String,

    /// Tool-specific payload.
    #[serde(flatten)]
    pub action: StepAction,

    /// Candidate actions attached after an OBSERVE execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Vec<ActionDescriptor>>,

    /// Opaque payload attached after an EXTRACT execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<Value>,
}

impl Step {
    pub fn new(
        step_number: u32,
        text: impl Into<String>,
        reasoning: impl Into<String>,
        action: StepAction,
    ) -> Self {
        Self {
            step_number,
            text: text.into(),
            reasoning: reasoning.into(),
            action,
            observation: None,
            extraction: None,
        }
    }

    pub fn tool(&self) -> StepTool {
        self.action.tool()
    }
}

/// Who a projected message originates from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// A task the user issued.
    User,
    /// A step or outcome the agent produced.
    Agent,
}

/// Externally consumable record of run progress.
///
/// One event is emitted per completed step plus a final event per run; the
/// payload carries serialized observation/extraction data, opaque to the
/// core and interpreted defensively by presentation layers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub role: MessageRole,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<StepTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl MessageEvent {
    /// Event for a user-issued goal.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
            reasoning: None,
            tool: None,
            step_number: None,
            payload: None,
        }
    }

    /// Event for an agent-produced message.
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Agent,
            text: text.into(),
            reasoning: None,
            tool: None,
            step_number: None,
            payload: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_tool(mut self, tool: StepTool) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn with_step_number(mut self, step_number: u32) -> Self {
        self.step_number = Some(step_number);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_parsing_accepts_legacy_synonyms() {
        assert_eq!(StepTool::parse("GOTO").unwrap(), StepTool::Navigate);
        assert_eq!(StepTool::parse("navigate").unwrap(), StepTool::Navigate);
        assert_eq!(StepTool::parse("NAVBACK").unwrap(), StepTool::NavigateBack);
        assert_eq!(StepTool::parse("CLOSE").unwrap(), StepTool::Complete);
        assert_eq!(StepTool::parse("complete").unwrap(), StepTool::Complete);
        assert!(matches!(
            StepTool::parse("TELEPORT"),
            Err(ModelError::UnknownTool(_))
        ));
    }

    #[test]
    fn wait_instruction_must_be_numeric() {
        let ok = StepAction::from_parts(StepTool::Wait, "2500", false, false).unwrap();
        assert_eq!(ok, StepAction::Wait { duration_ms: 2500 });

        let err = StepAction::from_parts(StepTool::Wait, "a moment", false, false).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInstruction { .. }));
    }

    #[test]
    fn flags_land_on_their_own_variants() {
        let act = StepAction::from_parts(StepTool::Act, "click login", true, true).unwrap();
        assert_eq!(
            act,
            StepAction::Act {
                instruction: "click login".to_string(),
                use_structured_action: true,
            }
        );

        let observe = StepAction::from_parts(StepTool::Observe, "find links", true, true).unwrap();
        assert_eq!(
            observe,
            StepAction::Observe {
                instruction: "find links".to_string(),
                wait_for_user_choice: true,
            }
        );
    }

    #[test]
    fn descriptor_round_trips_through_json() {
        let descriptor = ActionDescriptor::new("Click the login button", "click", "#login", "")
            .with_argument("left");
        let raw = serde_json::to_string(&descriptor).unwrap();
        let parsed = ActionDescriptor::from_json(&raw).unwrap();
        assert_eq!(parsed, descriptor);
    }

    #[test]
    fn descriptor_requires_an_argument() {
        let err = ActionDescriptor::from_json(
            r##"{"description":"x","method":"click","selector":"#a","arguments":[]}"##,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::MalformedDescriptor(_)));
    }

    #[test]
    fn step_serializes_with_tool_tag() {
        let step = Step::new(
            3,
            "Open the docs",
            "The docs likely hold the answer",
            StepAction::Navigate {
                url: "https://example.com/docs".to_string(),
            },
        );
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["tool"], json!("navigate"));
        assert_eq!(value["step_number"], json!(3));
        assert!(value.get("observation").is_none());
    }
}
