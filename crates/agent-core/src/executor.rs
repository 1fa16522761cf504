//! Execution of a single planned step against a session handle.

use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::debug;

use webpilot_core_types::{ActionDescriptor, StepAction};
use webpilot_engine::{ActInvocation, BrowserEngine, EngineError};
use webpilot_registry::SessionHandle;

use crate::agent_loop::AgentLoopConfig;

/// What executing one step produced.
///
/// Failures are captured here rather than raised: the orchestrator decides
/// what a failed step means for the run, and the session handle stays
/// usable either way.
#[derive(Clone, Debug, Default)]
pub struct ExecutionOutcome {
    /// Whether the browser-side operation succeeded.
    pub success: bool,
    /// Whether this step ends the run (terminal step, or an observation
    /// that suspends for a human choice).
    pub done: bool,
    /// Candidate actions returned by OBSERVE.
    pub observation: Option<Vec<ActionDescriptor>>,
    /// Opaque payload returned by EXTRACT.
    pub extraction: Option<Value>,
    /// Descriptive cause when `success` is false.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    fn succeeded() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    fn finished() -> Self {
        Self {
            success: true,
            done: true,
            ..Self::default()
        }
    }

    fn failed(cause: impl Into<String>) -> Self {
        Self {
            error: Some(cause.into()),
            ..Self::default()
        }
    }
}

/// Execute one step, holding the session's execution lock for the duration
/// so concurrent runs against the same session cannot interleave.
pub async fn execute_step(
    handle: &SessionHandle,
    action: &StepAction,
    config: &AgentLoopConfig,
) -> ExecutionOutcome {
    let _exclusive = handle.lock_execution().await;
    if handle.is_terminated() {
        return ExecutionOutcome::failed("session was terminated");
    }
    let engine = handle.engine();
    debug!(session = %handle.id(), tool = %action.tool(), "executing step");

    match action {
        StepAction::Navigate { url } => {
            bounded(
                engine.goto_url(url, Duration::from_millis(config.navigate_timeout_ms)),
                "navigate",
                config.navigate_timeout_ms,
            )
            .await
        }
        StepAction::Act {
            instruction,
            use_structured_action,
        } => {
            let invocation = if *use_structured_action {
                match ActionDescriptor::from_json(instruction) {
                    Ok(descriptor) => ActInvocation::Structured(descriptor),
                    Err(err) => return ExecutionOutcome::failed(err.to_string()),
                }
            } else {
                ActInvocation::Freeform(instruction.clone())
            };
            bounded(
                engine.perform_action(&invocation),
                "act",
                config.act_timeout_ms,
            )
            .await
        }
        StepAction::Extract { instruction } => match engine.extract(instruction).await {
            Ok(payload) => ExecutionOutcome {
                extraction: Some(payload),
                ..ExecutionOutcome::succeeded()
            },
            Err(err) => ExecutionOutcome::failed(err.to_string()),
        },
        StepAction::Observe {
            instruction,
            wait_for_user_choice,
        } => match engine.observe(instruction).await {
            Ok(actions) => ExecutionOutcome {
                done: *wait_for_user_choice,
                observation: Some(actions),
                ..ExecutionOutcome::succeeded()
            },
            Err(err) => ExecutionOutcome::failed(err.to_string()),
        },
        StepAction::Wait { duration_ms } => {
            // Suspends this call only; the host keeps scheduling other work.
            sleep(Duration::from_millis(*duration_ms)).await;
            ExecutionOutcome::succeeded()
        }
        StepAction::NavigateBack => match engine.go_back().await {
            Ok(()) => ExecutionOutcome::succeeded(),
            Err(err) => ExecutionOutcome::failed(err.to_string()),
        },
        StepAction::Complete => ExecutionOutcome::finished(),
    }
}

async fn bounded(
    operation: impl std::future::Future<Output = Result<(), EngineError>>,
    name: &str,
    timeout_ms: u64,
) -> ExecutionOutcome {
    match timeout(Duration::from_millis(timeout_ms), operation).await {
        Ok(Ok(())) => ExecutionOutcome::succeeded(),
        Ok(Err(err)) => ExecutionOutcome::failed(err.to_string()),
        Err(_) => ExecutionOutcome::failed(EngineError::timeout(name, timeout_ms).to_string()),
    }
}

/// Attach an outcome's result payloads to the step it executed.
pub fn attach_outcome(step: &mut webpilot_core_types::Step, outcome: &ExecutionOutcome) {
    step.observation = outcome.observation.clone();
    step.extraction = outcome.extraction.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use serde_json::json;
    use webpilot_core_types::SessionId;
    use webpilot_engine::{EngineCall, ScriptedEngine, ScriptedEngineFactory};
    use webpilot_registry::SessionRegistry;

    async fn handle_for(engine: Arc<ScriptedEngine>) -> Arc<SessionHandle> {
        let factory = ScriptedEngineFactory::new();
        let id = engine.session().clone();
        factory.prepare(id.clone(), engine);
        let registry = SessionRegistry::new(Arc::new(factory));
        registry.acquire(&id).await.unwrap()
    }

    #[tokio::test]
    async fn extract_attaches_the_engine_payload() {
        let engine = Arc::new(
            ScriptedEngine::new(SessionId::from("s"))
                .with_extraction(json!({"price": "42.00"})),
        );
        let handle = handle_for(Arc::clone(&engine)).await;

        let outcome = execute_step(
            &handle,
            &StepAction::Extract {
                instruction: "the listed price".to_string(),
            },
            &AgentLoopConfig::minimal(),
        )
        .await;

        assert!(outcome.success);
        assert!(!outcome.done);
        assert_eq!(outcome.extraction, Some(json!({"price": "42.00"})));
    }

    #[tokio::test]
    async fn observe_with_user_choice_marks_done() {
        let engine = Arc::new(ScriptedEngine::new(SessionId::from("s")).with_observation(vec![
            ActionDescriptor::new("Click pricing", "click", "a.pricing", ""),
        ]));
        let handle = handle_for(engine).await;

        let outcome = execute_step(
            &handle,
            &StepAction::Observe {
                instruction: "links".to_string(),
                wait_for_user_choice: true,
            },
            &AgentLoopConfig::minimal(),
        )
        .await;

        assert!(outcome.success);
        assert!(outcome.done);
        assert_eq!(outcome.observation.map(|o| o.len()), Some(1));
    }

    #[tokio::test]
    async fn malformed_structured_action_fails_without_engine_dispatch() {
        let engine = Arc::new(ScriptedEngine::new(SessionId::from("s")));
        let handle = handle_for(Arc::clone(&engine)).await;

        let outcome = execute_step(
            &handle,
            &StepAction::Act {
                instruction: "{not json".to_string(),
                use_structured_action: true,
            },
            &AgentLoopConfig::minimal(),
        )
        .await;

        assert!(!outcome.success);
        assert!(outcome.error.is_some());
        assert!(!engine
            .calls()
            .iter()
            .any(|call| matches!(call, EngineCall::Act(_))));
    }

    #[tokio::test]
    async fn engine_failure_leaves_the_handle_usable() {
        let engine = Arc::new(ScriptedEngine::new(SessionId::from("s")));
        let handle = handle_for(Arc::clone(&engine)).await;

        // A bad structured action fails this step only.
        let failed = execute_step(
            &handle,
            &StepAction::Act {
                instruction: "oops".to_string(),
                use_structured_action: true,
            },
            &AgentLoopConfig::minimal(),
        )
        .await;
        assert!(!failed.success);

        let ok = execute_step(
            &handle,
            &StepAction::Navigate {
                url: "https://example.com".to_string(),
            },
            &AgentLoopConfig::minimal(),
        )
        .await;
        assert!(ok.success);
    }

    #[tokio::test]
    async fn complete_has_no_engine_side_effect() {
        let engine = Arc::new(ScriptedEngine::new(SessionId::from("s")));
        let handle = handle_for(Arc::clone(&engine)).await;
        let before = engine.calls().len();

        let outcome = execute_step(&handle, &StepAction::Complete, &AgentLoopConfig::minimal()).await;

        assert!(outcome.success);
        assert!(outcome.done);
        assert_eq!(engine.calls().len(), before);
    }
}
