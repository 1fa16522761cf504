//! HTTP surface exposing the orchestrator operations.

mod router;
mod state;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use webpilot_agent::AgentLoop;

pub use router::build_router;
pub use state::ServeState;

/// Bind and serve the orchestrator API until shutdown.
pub async fn serve(agent: Arc<AgentLoop>, bind: &str) -> Result<()> {
    let router = build_router(ServeState::new(agent));
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "serving orchestrator API");
    axum::serve(listener, router).await?;
    Ok(())
}
