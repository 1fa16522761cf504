//! WebPilot application library.
//!
//! Wires the agent core to concrete collaborators: layered configuration,
//! the OpenAI-compatible reasoning adapter, and the CLI/HTTP surfaces.

pub mod config;
pub mod llm;
pub mod server;

pub use config::AppConfig;
pub use llm::OpenAiReasoner;
