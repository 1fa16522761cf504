//! Layered application configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `WEBPILOT_*` environment variables (double underscore separates
//! sections, e.g. `WEBPILOT_REASONING__MODEL`).

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use webpilot_agent::AgentLoopConfig;

/// Reasoning-service settings for the OpenAI-compatible adapter.
#[derive(Clone, Debug, Deserialize)]
pub struct ReasoningSettings {
    /// Base URL of the chat-completions API.
    pub base_url: String,
    /// API key; falls back to the OPENAI_API_KEY environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
}

impl ReasoningSettings {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

/// Remote automation-service settings.
#[derive(Clone, Debug, Deserialize)]
pub struct EngineSettings {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// HTTP serve-mode settings.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerSettings {
    pub bind: String,
}

/// Agent loop overrides.
#[derive(Clone, Debug, Deserialize)]
pub struct AgentSettings {
    pub max_steps: u32,
    pub navigate_timeout_ms: u64,
    pub act_timeout_ms: u64,
    pub capture_screenshots: bool,
}

impl AgentSettings {
    pub fn to_loop_config(&self) -> AgentLoopConfig {
        AgentLoopConfig::new()
            .max_steps(self.max_steps)
            .navigate_timeout_ms(self.navigate_timeout_ms)
            .act_timeout_ms(self.act_timeout_ms)
            .screenshots(self.capture_screenshots)
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub reasoning: ReasoningSettings,
    pub engine: EngineSettings,
    pub server: ServerSettings,
    pub agent: AgentSettings,
}

/// Load configuration: defaults, then the optional file, then environment.
pub fn load(config_file: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        .set_default("reasoning.base_url", "https://api.openai.com/v1")?
        .set_default("reasoning.model", "gpt-4o")?
        .set_default("engine.base_url", "http://127.0.0.1:4100")?
        .set_default("server.bind", "127.0.0.1:4000")?
        .set_default("agent.max_steps", 50i64)?
        .set_default("agent.navigate_timeout_ms", 60_000i64)?
        .set_default("agent.act_timeout_ms", 60_000i64)?
        .set_default("agent.capture_screenshots", true)?;

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path.to_path_buf()));
    }

    builder
        .add_source(Environment::with_prefix("WEBPILOT").separator("__"))
        .build()?
        .try_deserialize()
}
