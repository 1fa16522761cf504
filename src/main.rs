use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use url::Url;

use webpilot_agent::{AgentLoop, AgentLoopConfig, RunStatus, ScriptedReasoner};
use webpilot_cli::config::{self, AppConfig};
use webpilot_cli::llm::OpenAiReasoner;
use webpilot_cli::server;
use webpilot_core_types::{MessageRole, SessionId};
use webpilot_engine::{RemoteEngineFactory, ScriptedEngine, ScriptedEngineFactory};
use webpilot_registry::SessionRegistry;

#[derive(Parser)]
#[command(name = "webpilot", version, about = "LLM-driven web automation agent")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one goal against the configured automation service.
    Run {
        /// Natural-language goal for the agent.
        #[arg(long)]
        goal: String,

        /// Reuse an existing session id instead of creating a fresh one.
        #[arg(long)]
        session: Option<String>,
    },
    /// Run an offline demo with scripted collaborators and print the report.
    Demo {
        #[arg(long, default_value = "https://example.com")]
        goal: String,
    },
    /// Serve the orchestrator API over HTTP.
    Serve {
        /// Bind address, overriding the configured one.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app_config = config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run { goal, session } => run_task(&app_config, &goal, session).await,
        Command::Demo { goal } => run_demo(&goal).await,
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| app_config.server.bind.clone());
            let agent = build_agent(&app_config)?;
            server::serve(Arc::new(agent), &bind).await
        }
    }
}

fn build_agent(app_config: &AppConfig) -> Result<AgentLoop> {
    let api_key = app_config.reasoning.resolve_api_key().context(
        "no reasoning API key configured (set WEBPILOT_REASONING__API_KEY or OPENAI_API_KEY)",
    )?;
    let reasoner = Arc::new(OpenAiReasoner::new(
        &app_config.reasoning.base_url,
        api_key,
        &app_config.reasoning.model,
    ));
    let engine_base = Url::parse(&app_config.engine.base_url)
        .context("engine.base_url is not a valid URL")?;
    let factory = RemoteEngineFactory::new(engine_base, app_config.engine.api_key.clone());
    let registry = Arc::new(SessionRegistry::new(Arc::new(factory)));
    Ok(AgentLoop::new(
        registry,
        reasoner,
        app_config.agent.to_loop_config(),
    ))
}

async fn run_task(app_config: &AppConfig, goal: &str, session: Option<String>) -> Result<()> {
    let (events, mut progress) = tokio::sync::mpsc::unbounded_channel();
    let agent = build_agent(app_config)?.with_events(events);

    let printer = tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            let speaker = match event.role {
                MessageRole::User => "you",
                MessageRole::Agent => "agent",
            };
            eprintln!("[{speaker}] {}", event.text);
        }
    });

    let session_id = session.map(SessionId).unwrap_or_default();
    let report = agent.start_task(&session_id, goal).await?;

    drop(agent);
    let _ = printer.await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Offline demonstration: a scripted engine and reasoner walk the loop
/// end to end without touching the network.
async fn run_demo(goal: &str) -> Result<()> {
    let session = SessionId::new();
    let factory = ScriptedEngineFactory::new();
    factory.prepare(
        session.clone(),
        Arc::new(ScriptedEngine::new(session.clone()).with_live_view("https://live.example/demo")),
    );
    let registry = Arc::new(SessionRegistry::new(Arc::new(factory)));

    let reasoner = ScriptedReasoner::new(vec![
        json!({
            "url": "https://example.com",
            "reasoning": "The demo always starts at the illustrative domain.",
        }),
        json!({
            "text": format!("Demo run finished for goal: {goal}"),
            "reasoning": "The scripted demo completes after the first page.",
            "tool": "COMPLETE",
            "instruction": "",
        }),
    ]);

    let agent = AgentLoop::new(registry, Arc::new(reasoner), AgentLoopConfig::minimal());
    let report = agent.start_task(&session, goal).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
