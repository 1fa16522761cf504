//! End-to-end properties of the agent loop, driven through the public API
//! with scripted reasoning responses and instrumented engines.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use webpilot_agent::{
    AgentError, AgentLoop, AgentLoopConfig, CompletionRequest, FailureCause, ReasoningProvider,
    RunStatus, ScriptedReasoner,
};
use webpilot_core_types::{ActionDescriptor, SessionId, StepTool};
use webpilot_engine::{
    ActInvocation, BrowserEngine, EngineCall, EngineError, ScriptedEngine, ScriptedEngineFactory,
};
use webpilot_registry::SessionRegistry;

fn agent_with(
    factory: ScriptedEngineFactory,
    provider: Arc<dyn ReasoningProvider>,
    config: AgentLoopConfig,
) -> AgentLoop {
    let registry = Arc::new(SessionRegistry::new(Arc::new(factory)));
    AgentLoop::new(registry, provider, config)
}

fn start_response(url: &str) -> Value {
    json!({ "url": url, "reasoning": "chosen starting point" })
}

fn step_response(tool: &str, instruction: &str) -> Value {
    json!({
        "text": format!("{tool} step"),
        "reasoning": "scripted decision",
        "tool": tool,
        "instruction": instruction,
    })
}

/// Counts completions so tests can assert "no further planning".
struct CountingProvider {
    inner: Arc<dyn ReasoningProvider>,
    calls: AtomicUsize,
}

impl CountingProvider {
    fn new(inner: Arc<dyn ReasoningProvider>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningProvider for CountingProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.complete(request).await
    }
}

/// Stateless provider: answers starting-point requests with a fixed URL and
/// keeps choosing ACT until its countdown runs out, then COMPLETE.
struct CountdownProvider {
    acts_remaining: AtomicI64,
}

impl CountdownProvider {
    fn new(acts: i64) -> Self {
        Self {
            acts_remaining: AtomicI64::new(acts),
        }
    }

    fn is_step_request(request: &CompletionRequest) -> bool {
        request.schema["properties"]["tool"].is_object()
    }
}

#[async_trait]
impl ReasoningProvider for CountdownProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, AgentError> {
        if !Self::is_step_request(request) {
            return Ok(start_response("https://example.com/"));
        }
        if self.acts_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            Ok(step_response("ACT", "click the next link"))
        } else {
            Ok(step_response("COMPLETE", ""))
        }
    }
}

/// Engine that tracks overlapping executor dispatches. Reads used for
/// planner grounding are left uninstrumented; only the mutating executor
/// operations count toward the exclusivity window.
#[derive(Default)]
struct OverlapEngine {
    active: AtomicUsize,
    max_active: AtomicUsize,
    executed: AtomicUsize,
}

impl OverlapEngine {
    async fn window(&self) -> Result<(), EngineError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BrowserEngine for OverlapEngine {
    async fn init(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn goto_url(&self, _url: &str, _timeout: Duration) -> Result<(), EngineError> {
        self.window().await
    }

    async fn perform_action(&self, _invocation: &ActInvocation) -> Result<(), EngineError> {
        self.window().await
    }

    async fn extract(&self, _instruction: &str) -> Result<Value, EngineError> {
        self.window().await?;
        Ok(Value::Null)
    }

    async fn observe(&self, _instruction: &str) -> Result<Vec<ActionDescriptor>, EngineError> {
        self.window().await?;
        Ok(Vec::new())
    }

    async fn go_back(&self) -> Result<(), EngineError> {
        self.window().await
    }

    async fn current_url(&self) -> Result<String, EngineError> {
        Ok("https://example.com/".to_string())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, EngineError> {
        Ok(Vec::new())
    }

    async fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[tokio::test]
async fn navigate_and_summarize_completes_with_two_steps() {
    let session = SessionId::from("nav-summarize");
    let reasoner = ScriptedReasoner::new(vec![
        start_response("https://example.com"),
        json!({
            "text": "example.com is a reserved illustrative domain",
            "reasoning": "the page itself answers the goal",
            "tool": "COMPLETE",
            "instruction": "",
        }),
    ]);
    let agent = agent_with(
        ScriptedEngineFactory::new(),
        Arc::new(reasoner),
        AgentLoopConfig::minimal(),
    );

    let report = agent
        .start_task(&session, "https://example.com")
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Complete);
    assert_eq!(report.history.len(), 2);
    assert_eq!(report.history[0].tool(), StepTool::Navigate);
    assert_eq!(report.history[1].tool(), StepTool::Complete);
    assert_eq!(
        report.summary,
        "example.com is a reserved illustrative domain"
    );
    // goal + one event per step + final outcome
    assert_eq!(report.messages.len(), 4);
}

#[tokio::test]
async fn step_numbers_are_gapless_and_increasing() {
    let session = SessionId::from("monotonic");
    let agent = agent_with(
        ScriptedEngineFactory::new(),
        Arc::new(CountdownProvider::new(4)),
        AgentLoopConfig::minimal(),
    );

    let report = agent.start_task(&session, "walk a few links").await.unwrap();

    assert_eq!(report.status, RunStatus::Complete);
    let numbers: Vec<u32> = report.history.iter().map(|s| s.step_number).collect();
    let expected: Vec<u32> = (1..=report.history.len() as u32).collect();
    assert_eq!(numbers, expected);
}

#[tokio::test]
async fn observe_with_user_choice_suspends_and_resumes_single_shot() {
    let session = SessionId::from("suspend-resume");
    let engine = Arc::new(ScriptedEngine::new(session.clone()).with_observation(vec![
        ActionDescriptor::new("Open the docs", "click", "a.docs", ""),
        ActionDescriptor::new("Open the blog", "click", "a.blog", ""),
        ActionDescriptor::new("Open the pricing page", "click", "a.pricing", ""),
    ]));
    let factory = ScriptedEngineFactory::new();
    factory.prepare(session.clone(), Arc::clone(&engine));

    let provider = Arc::new(CountingProvider::new(Arc::new(ScriptedReasoner::new(vec![
        start_response("https://example.com"),
        json!({
            "text": "Which section should I open?",
            "reasoning": "the user should pick the destination",
            "tool": "OBSERVE",
            "instruction": "top-level navigation links",
            "wait_for_user_choice": true,
        }),
    ]))));
    let agent = agent_with(factory, Arc::clone(&provider) as _, AgentLoopConfig::minimal());

    let report = agent.start_task(&session, "open a section").await.unwrap();
    assert_eq!(report.status, RunStatus::Suspended);
    let choices = report.pending_choices.as_ref().unwrap();
    assert_eq!(choices.len(), 3);
    let planning_calls_before_resume = provider.calls();

    let resumed = agent.resume_with_chosen_action(&report, 1).await.unwrap();

    assert_eq!(resumed.status, RunStatus::Complete);
    assert_eq!(provider.calls(), planning_calls_before_resume);
    assert_eq!(resumed.history.len(), 3);
    assert_eq!(resumed.history[2].step_number, 3);

    let calls = engine.calls();
    let acts: Vec<&EngineCall> = calls
        .iter()
        .filter(|call| matches!(call, EngineCall::Act(_)))
        .collect();
    assert_eq!(acts.len(), 1);
    match acts[0] {
        EngineCall::Act(ActInvocation::Structured(descriptor)) => {
            assert_eq!(descriptor.description, "Open the blog");
        }
        other => panic!("expected a structured act, got {other:?}"),
    }
}

#[tokio::test]
async fn resume_rejects_bad_requests() {
    let session = SessionId::from("resume-misuse");
    let engine = Arc::new(ScriptedEngine::new(session.clone()).with_observation(vec![
        ActionDescriptor::new("Only option", "click", "a", ""),
    ]));
    let factory = ScriptedEngineFactory::new();
    factory.prepare(session.clone(), Arc::clone(&engine));

    let agent = agent_with(
        factory,
        Arc::new(ScriptedReasoner::new(vec![
            start_response("https://example.com"),
            json!({
                "text": "Pick one",
                "reasoning": "needs a human",
                "tool": "OBSERVE",
                "instruction": "links",
                "wait_for_user_choice": true,
            }),
        ])),
        AgentLoopConfig::minimal(),
    );

    let suspended = agent.start_task(&session, "goal").await.unwrap();
    let err = agent
        .resume_with_chosen_action(&suspended, 7)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidRequest(_)));

    let finished = agent.resume_with_chosen_action(&suspended, 0).await.unwrap();
    let err = agent
        .resume_with_chosen_action(&finished, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidRequest(_)));
}

#[tokio::test]
async fn planner_contract_violation_fails_run_but_keeps_session() {
    let session = SessionId::from("bad-tool");
    let engine = Arc::new(ScriptedEngine::new(session.clone()));
    let factory = ScriptedEngineFactory::new();
    factory.prepare(session.clone(), Arc::clone(&engine));

    let agent = agent_with(
        factory,
        Arc::new(ScriptedReasoner::new(vec![
            start_response("https://example.com"),
            step_response("TELEPORT", "somewhere"),
        ])),
        AgentLoopConfig::minimal(),
    );

    let report = agent.start_task(&session, "goal").await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failure, Some(FailureCause::Planning));
    // The browser session survives the planning failure.
    assert!(agent.registry().contains(&session));
    assert!(!engine.is_closed());
}

#[tokio::test]
async fn starting_point_failure_cleans_up_the_fresh_session() {
    let session = SessionId::from("no-start");
    let agent = agent_with(
        ScriptedEngineFactory::new(),
        Arc::new(ScriptedReasoner::new(vec![json!({
            "url": "not a url at all",
            "reasoning": "confused",
        })])),
        AgentLoopConfig::minimal(),
    );

    let report = agent.start_task(&session, "goal").await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failure, Some(FailureCause::Planning));
    assert!(report.history.is_empty());
    assert!(!agent.registry().contains(&session));
}

#[tokio::test]
async fn execution_failure_aborts_run_but_session_survives() {
    let session = SessionId::from("bad-act");
    let engine = Arc::new(ScriptedEngine::new(session.clone()));
    let factory = ScriptedEngineFactory::new();
    factory.prepare(session.clone(), Arc::clone(&engine));

    let agent = agent_with(
        factory,
        Arc::new(ScriptedReasoner::new(vec![
            start_response("https://example.com"),
            json!({
                "text": "Replay the saved action",
                "reasoning": "scripted",
                "tool": "ACT",
                "instruction": "{definitely not json",
                "use_structured_action": true,
            }),
        ])),
        AgentLoopConfig::minimal(),
    );

    let report = agent.start_task(&session, "goal").await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failure, Some(FailureCause::Execution));
    assert_eq!(report.history.len(), 2);
    assert!(agent.registry().contains(&session));
    assert!(!engine.is_closed());
}

#[tokio::test]
async fn step_limit_forces_failure_instead_of_looping() {
    let session = SessionId::from("runaway");
    let engine = Arc::new(ScriptedEngine::new(session.clone()));
    let factory = ScriptedEngineFactory::new();
    factory.prepare(session.clone(), Arc::clone(&engine));

    let max_steps = 5;
    let agent = agent_with(
        factory,
        Arc::new(CountdownProvider::new(i64::MAX)),
        AgentLoopConfig::minimal().max_steps(max_steps),
    );

    let report = agent.start_task(&session, "never finishes").await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failure, Some(FailureCause::StepLimit));
    assert_eq!(report.history.len(), max_steps as usize);

    // One navigation plus max_steps - 1 acts; nothing beyond the cap.
    let acts = engine
        .calls()
        .iter()
        .filter(|call| matches!(call, EngineCall::Act(_)))
        .count();
    assert_eq!(acts, max_steps as usize - 1);
}

#[tokio::test]
async fn concurrent_runs_on_one_session_never_overlap_executor_calls() {
    let session = SessionId::from("exclusive");
    let engine = Arc::new(OverlapEngine::default());
    let engine_for_factory = Arc::clone(&engine);
    let factory = move |_id: &SessionId| -> Result<Arc<dyn BrowserEngine>, EngineError> {
        Ok(Arc::clone(&engine_for_factory) as Arc<dyn BrowserEngine>)
    };

    let registry = Arc::new(SessionRegistry::new(Arc::new(factory)));
    let agent = AgentLoop::new(
        registry,
        Arc::new(CountdownProvider::new(6)),
        AgentLoopConfig::minimal(),
    );

    let (a, b) = tokio::join!(
        agent.start_task(&session, "first goal"),
        agent.start_task(&session, "second goal")
    );
    a.unwrap();
    b.unwrap();

    assert!(engine.executed.load(Ordering::SeqCst) >= 2);
    assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn terminate_is_idempotent() {
    let session = SessionId::from("terminate-twice");
    let engine = Arc::new(ScriptedEngine::new(session.clone()));
    let factory = ScriptedEngineFactory::new();
    factory.prepare(session.clone(), Arc::clone(&engine));

    let agent = agent_with(
        factory,
        Arc::new(ScriptedReasoner::new(vec![
            start_response("https://example.com"),
            step_response("COMPLETE", ""),
        ])),
        AgentLoopConfig::minimal(),
    );

    agent.start_task(&session, "goal").await.unwrap();

    let first = agent.terminate(&session).await;
    assert!(first.is_some());
    assert!(engine.is_closed());

    let second = agent.terminate(&session).await;
    assert!(second.is_none());
}

#[tokio::test]
async fn follow_up_restarts_step_numbering_on_the_same_session() {
    let session = SessionId::from("follow-up");
    let engine = Arc::new(ScriptedEngine::new(session.clone()));
    let factory = ScriptedEngineFactory::new();
    factory.prepare(session.clone(), Arc::clone(&engine));

    let agent = agent_with(
        factory,
        Arc::new(ScriptedReasoner::new(vec![
            start_response("https://example.com"),
            step_response("COMPLETE", ""),
            // follow-up: one extract step, then complete
            json!({
                "text": "Read the page title",
                "reasoning": "the follow-up asks about this page",
                "tool": "EXTRACT",
                "instruction": "the page title",
            }),
            step_response("COMPLETE", ""),
        ])),
        AgentLoopConfig::minimal(),
    );

    let first = agent.start_task(&session, "open example.com").await.unwrap();
    assert_eq!(first.status, RunStatus::Complete);

    let follow_up = agent
        .submit_follow_up(&session, "what is the title?", &first.messages)
        .await
        .unwrap();

    assert_eq!(follow_up.status, RunStatus::Complete);
    assert_eq!(follow_up.history[0].step_number, 1);
    assert_eq!(follow_up.history[0].tool(), StepTool::Extract);
    assert_eq!(follow_up.history[1].step_number, 2);
}

#[tokio::test]
async fn follow_up_requires_a_live_session() {
    let agent = agent_with(
        ScriptedEngineFactory::new(),
        Arc::new(ScriptedReasoner::new(Vec::new())),
        AgentLoopConfig::minimal(),
    );

    let err = agent
        .submit_follow_up(&SessionId::from("ghost"), "anything", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidRequest(_)));
}
