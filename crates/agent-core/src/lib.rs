//! Planning and orchestration core of the WebPilot agent.
//!
//! The [`AgentLoop`] turns a natural-language goal into a bounded sequence
//! of browser steps: a [`StepPlanner`] consults the reasoning service for
//! one decision at a time, the executor performs it against the session's
//! engine, and every step is projected as a message event for presentation
//! layers. Collaborators (browser engine, reasoning service, session
//! registry) sit behind narrow contracts so the loop is testable end to end
//! with scripted fakes.

pub mod agent_loop;
pub mod errors;
pub mod executor;
pub mod planner;
pub mod projector;
pub mod reasoner;

pub use agent_loop::{AgentLoop, AgentLoopConfig, FailureCause, RunReport, RunStatus};
pub use errors::AgentError;
pub use executor::ExecutionOutcome;
pub use planner::{StartingPoint, StepPlanner};
pub use reasoner::{CompletionRequest, ReasoningProvider, ScriptedReasoner};
