use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use webpilot_agent::{AgentError, RunReport};
use webpilot_core_types::{MessageEvent, SessionId};

use super::state::ServeState;

pub fn build_router(state: ServeState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/tasks", post(start_task_handler))
        .route("/v1/tasks/resume", post(resume_handler))
        .route("/v1/tasks/follow-up", post(follow_up_handler))
        .route("/v1/sessions/:id", delete(terminate_handler))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

async fn health_handler(State(state): State<ServeState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.agent().registry().len(),
    }))
}

#[derive(Debug, Deserialize)]
struct StartTaskRequest {
    #[serde(default)]
    session_id: Option<String>,
    goal: String,
}

async fn start_task_handler(
    State(state): State<ServeState>,
    Json(request): Json<StartTaskRequest>,
) -> Response {
    let session_id = request
        .session_id
        .map(SessionId)
        .unwrap_or_default();
    match state.agent().start_task(&session_id, &request.goal).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct ResumeRequest {
    report: RunReport,
    choice: usize,
}

async fn resume_handler(
    State(state): State<ServeState>,
    Json(request): Json<ResumeRequest>,
) -> Response {
    match state
        .agent()
        .resume_with_chosen_action(&request.report, request.choice)
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct FollowUpRequest {
    session_id: String,
    goal: String,
    #[serde(default)]
    prior_messages: Vec<MessageEvent>,
}

async fn follow_up_handler(
    State(state): State<ServeState>,
    Json(request): Json<FollowUpRequest>,
) -> Response {
    let session_id = SessionId(request.session_id);
    match state
        .agent()
        .submit_follow_up(&session_id, &request.goal, &request.prior_messages)
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(err) => error_response(err),
    }
}

async fn terminate_handler(
    State(state): State<ServeState>,
    Path(session_id): Path<String>,
) -> Json<serde_json::Value> {
    let screenshot = state.agent().terminate(&SessionId(session_id)).await;
    Json(json!({
        "screenshot_base64": screenshot.map(|bytes| BASE64.encode(bytes)),
    }))
}

fn error_response(err: AgentError) -> Response {
    let status = match &err {
        AgentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AgentError::SessionInit(_) | AgentError::Planning(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(%err, "request failed");
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
