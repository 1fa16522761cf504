//! The orchestrator: a state machine turning one goal into a bounded,
//! recoverable sequence of browser steps.
//!
//! A run moves STARTING -> (PLANNING -> EXECUTING)* and ends in exactly one
//! of COMPLETE, FAILED or SUSPENDED. Planning and execution alternate
//! strictly; the executor only ever runs the step the planner just
//! produced.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use webpilot_core_types::{ActionDescriptor, MessageEvent, SessionId, Step, StepAction, TaskId};
use webpilot_registry::{SessionHandle, SessionRegistry};

use crate::agent_loop::config::AgentLoopConfig;
use crate::errors::AgentError;
use crate::executor;
use crate::planner::StepPlanner;
use crate::projector;
use crate::reasoner::ReasoningProvider;

/// Terminal status of one orchestration run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The planner chose a terminal step, or a resumed action finished.
    Complete,
    /// An OBSERVE step is waiting for a human to pick a candidate action.
    Suspended,
    /// The run was aborted; see the report's failure cause.
    Failed,
}

/// Why a run failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The reasoning service was unreachable or violated its contract.
    Planning,
    /// A browser-side step failed.
    Execution,
    /// The configured maximum step count was reached.
    StepLimit,
    /// The session was terminated out from under the run.
    Terminated,
}

/// Result of one orchestration run.
///
/// A suspended report doubles as the resume handle: it carries the
/// candidate actions and everything needed to finish the run later.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: SessionId,
    /// Identifies this run; a resumed run keeps the task id it suspended
    /// under.
    pub task_id: TaskId,
    pub status: RunStatus,
    /// Final summary on completion, or the failure cause.
    pub summary: String,
    /// Every step of this run, in order.
    pub history: Vec<Step>,
    /// Projected transcript: the goal, one event per step, one outcome.
    pub messages: Vec<MessageEvent>,
    /// Candidate actions awaiting a human choice; set only when suspended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_choices: Option<Vec<ActionDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureCause>,
    /// Human-viewable debug URL for the live browser, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_view_url: Option<String>,
}

impl RunReport {
    pub fn is_suspended(&self) -> bool {
        self.status == RunStatus::Suspended
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }
}

/// How a step left the run.
enum Terminal {
    Complete(String),
    Suspend {
        summary: String,
        choices: Vec<ActionDescriptor>,
    },
    Fail {
        cause: FailureCause,
        message: String,
    },
}

/// State owned by a single run; never shared across runs.
struct RunCtx {
    handle: Arc<SessionHandle>,
    task_id: TaskId,
    history: Vec<Step>,
    messages: Vec<MessageEvent>,
}

impl RunCtx {
    fn fresh(handle: Arc<SessionHandle>) -> Self {
        Self {
            handle,
            task_id: TaskId::new(),
            history: Vec::new(),
            messages: Vec::new(),
        }
    }
}

/// The agent loop orchestrator.
pub struct AgentLoop {
    registry: Arc<SessionRegistry>,
    planner: StepPlanner,
    config: AgentLoopConfig,
    events: Option<UnboundedSender<MessageEvent>>,
}

impl AgentLoop {
    pub fn new(
        registry: Arc<SessionRegistry>,
        provider: Arc<dyn ReasoningProvider>,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            registry,
            planner: StepPlanner::new(provider),
            config,
            events: None,
        }
    }

    /// Stream projection events as the run progresses. Sends are
    /// fire-and-forget; a dropped receiver never stalls the loop.
    pub fn with_events(mut self, events: UnboundedSender<MessageEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AgentLoopConfig {
        &self.config
    }

    /// Run a fresh goal: acquire the session, pick a starting point,
    /// navigate there, then alternate planning and execution until a
    /// terminal state.
    ///
    /// Session acquisition failure is returned as an error with no history
    /// accumulated; every later failure is reported through the returned
    /// [`RunReport`].
    pub async fn start_task(
        &self,
        session_id: &SessionId,
        goal: &str,
    ) -> Result<RunReport, AgentError> {
        info!(session = %session_id, goal, "starting task");
        let handle = self.registry.acquire(session_id).await?;
        let mut ctx = RunCtx::fresh(handle);
        self.emit(&mut ctx, projector::goal_event(goal));

        let start = match self.planner.choose_starting_point(goal).await {
            Ok(start) => start,
            Err(err) => {
                // Nothing has touched the browser yet; drop the session so
                // no half-started registration lingers.
                warn!(session = %session_id, %err, "starting point selection failed");
                let _ = self.registry.release(session_id).await;
                return Ok(self.settle(
                    ctx,
                    Terminal::Fail {
                        cause: FailureCause::Planning,
                        message: err.to_string(),
                    },
                ));
            }
        };

        let step = Step::new(
            1,
            format!("Navigating to {}", start.url),
            start.reasoning,
            StepAction::Navigate {
                url: start.url.to_string(),
            },
        );
        match self.apply_step(&mut ctx, step).await {
            None => self.drive(ctx, goal).await,
            Some(terminal) => Ok(self.settle(ctx, terminal)),
        }
    }

    /// Run a follow-up goal on an existing session. The first step is
    /// planned from the conversation transcript and step numbering
    /// restarts at 1.
    pub async fn submit_follow_up(
        &self,
        session_id: &SessionId,
        goal: &str,
        prior_messages: &[MessageEvent],
    ) -> Result<RunReport, AgentError> {
        let handle = self.registry.get(session_id).ok_or_else(|| {
            AgentError::invalid_request(format!("no live session '{session_id}'"))
        })?;
        info!(session = %session_id, goal, "follow-up task");
        let mut ctx = RunCtx::fresh(handle);
        self.emit(&mut ctx, projector::goal_event(goal));

        let step = match self.planner.plan_follow_up(goal, prior_messages).await {
            Ok(step) => step,
            Err(err) => {
                // The session predates this run and stays registered.
                return Ok(self.settle(
                    ctx,
                    Terminal::Fail {
                        cause: FailureCause::Planning,
                        message: err.to_string(),
                    },
                ));
            }
        };
        match self.apply_step(&mut ctx, step).await {
            None => self.drive(ctx, goal).await,
            Some(terminal) => Ok(self.settle(ctx, terminal)),
        }
    }

    /// Finish a suspended run by executing the chosen candidate action.
    ///
    /// Single-shot: exactly one structured ACT is performed and the run
    /// ends without any further planning.
    pub async fn resume_with_chosen_action(
        &self,
        report: &RunReport,
        choice: usize,
    ) -> Result<RunReport, AgentError> {
        if report.status != RunStatus::Suspended {
            return Err(AgentError::invalid_request(
                "run is not suspended awaiting a choice",
            ));
        }
        let choices = report.pending_choices.as_deref().unwrap_or_default();
        let descriptor = choices.get(choice).cloned().ok_or_else(|| {
            AgentError::invalid_request(format!(
                "choice index {choice} out of range ({} available)",
                choices.len()
            ))
        })?;
        let handle = self.registry.get(&report.session_id).ok_or_else(|| {
            AgentError::invalid_request(format!("no live session '{}'", report.session_id))
        })?;
        info!(session = %report.session_id, choice, "resuming with chosen action");

        let mut ctx = RunCtx {
            handle,
            task_id: report.task_id.clone(),
            history: report.history.clone(),
            messages: report.messages.clone(),
        };
        let instruction = serde_json::to_string(&descriptor).map_err(|err| {
            AgentError::invalid_request(format!("chosen action is not serializable: {err}"))
        })?;
        let mut step = Step::new(
            ctx.history.len() as u32 + 1,
            format!("Performing chosen action: {}", descriptor.description),
            "The user selected this action from the observed candidates.",
            StepAction::Act {
                instruction,
                use_structured_action: true,
            },
        );

        let outcome = executor::execute_step(&ctx.handle, &step.action, &self.config).await;
        executor::attach_outcome(&mut step, &outcome);
        self.emit(&mut ctx, projector::step_event(&step));
        ctx.history.push(step);

        let terminal = match outcome.error {
            Some(error) => Terminal::Fail {
                cause: FailureCause::Execution,
                message: error,
            },
            None => Terminal::Complete(format!(
                "Executed chosen action: {}",
                descriptor.description
            )),
        };
        Ok(self.settle(ctx, terminal))
    }

    /// Tear the session down. Idempotent and callable at any point; an
    /// in-flight run observes the terminated handle and fails without
    /// leaking it.
    pub async fn terminate(&self, session_id: &SessionId) -> Option<Vec<u8>> {
        info!(session = %session_id, "terminating session");
        self.registry.release(session_id).await
    }

    /// The PLANNING <-> EXECUTING alternation.
    async fn drive(&self, mut ctx: RunCtx, goal: &str) -> Result<RunReport, AgentError> {
        loop {
            if ctx.handle.is_terminated() {
                return Ok(self.settle(
                    ctx,
                    Terminal::Fail {
                        cause: FailureCause::Terminated,
                        message: "session was terminated".to_string(),
                    },
                ));
            }
            if ctx.history.len() as u32 >= self.config.max_steps {
                let limit = self.config.max_steps;
                return Ok(self.settle(
                    ctx,
                    Terminal::Fail {
                        cause: FailureCause::StepLimit,
                        message: AgentError::StepLimitExceeded { limit }.to_string(),
                    },
                ));
            }

            let current_url = match ctx.handle.engine().current_url().await {
                Ok(url) => url,
                Err(err) => {
                    return Ok(self.settle(
                        ctx,
                        Terminal::Fail {
                            cause: FailureCause::Execution,
                            message: err.to_string(),
                        },
                    ))
                }
            };
            let screenshot = if self.config.capture_screenshots {
                match ctx.handle.engine().capture_screenshot().await {
                    Ok(bytes) => Some(BASE64.encode(bytes)),
                    Err(err) => {
                        warn!(%err, "screenshot capture failed; planning without vision");
                        None
                    }
                }
            } else {
                None
            };

            let step = match self
                .planner
                .plan_next(goal, &current_url, screenshot, &ctx.history)
                .await
            {
                Ok(step) => step,
                Err(err) => {
                    // The browser session stays registered and usable; only
                    // this run is lost.
                    return Ok(self.settle(
                        ctx,
                        Terminal::Fail {
                            cause: FailureCause::Planning,
                            message: err.to_string(),
                        },
                    ));
                }
            };

            match self.apply_step(&mut ctx, step).await {
                None => continue,
                Some(terminal) => return Ok(self.settle(ctx, terminal)),
            }
        }
    }

    /// Record and (unless terminal) execute one planned step. Returns
    /// `None` when the loop should keep planning.
    async fn apply_step(&self, ctx: &mut RunCtx, mut step: Step) -> Option<Terminal> {
        if matches!(step.action, StepAction::Complete) {
            let summary = step.text.clone();
            self.emit(ctx, projector::step_event(&step));
            ctx.history.push(step);
            return Some(Terminal::Complete(summary));
        }

        let outcome = executor::execute_step(&ctx.handle, &step.action, &self.config).await;
        executor::attach_outcome(&mut step, &outcome);
        self.emit(ctx, projector::step_event(&step));
        let summary = step.text.clone();
        let awaiting_choice = matches!(
            step.action,
            StepAction::Observe {
                wait_for_user_choice: true,
                ..
            }
        );
        ctx.history.push(step);

        if let Some(error) = outcome.error {
            return Some(Terminal::Fail {
                cause: FailureCause::Execution,
                message: error,
            });
        }
        if outcome.done {
            if awaiting_choice {
                return Some(Terminal::Suspend {
                    summary,
                    choices: outcome.observation.unwrap_or_default(),
                });
            }
            return Some(Terminal::Complete(summary));
        }
        None
    }

    fn settle(&self, mut ctx: RunCtx, terminal: Terminal) -> RunReport {
        let (status, summary, pending_choices, failure) = match terminal {
            Terminal::Complete(summary) => (RunStatus::Complete, summary, None, None),
            Terminal::Suspend { summary, choices } => {
                (RunStatus::Suspended, summary, Some(choices), None)
            }
            Terminal::Fail { cause, message } => {
                (RunStatus::Failed, message, None, Some(cause))
            }
        };
        self.emit(&mut ctx, projector::outcome_event(status, &summary));
        info!(
            session = %ctx.handle.id(),
            ?status,
            steps = ctx.history.len(),
            "run finished"
        );
        RunReport {
            session_id: ctx.handle.id().clone(),
            task_id: ctx.task_id,
            status,
            summary,
            history: ctx.history,
            messages: ctx.messages,
            pending_choices,
            failure,
            live_view_url: ctx.handle.live_view_url().map(str::to_string),
        }
    }

    fn emit(&self, ctx: &mut RunCtx, event: MessageEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event.clone());
        }
        ctx.messages.push(event);
    }
}
