//! Agent loop orchestration.

mod config;
mod controller;

pub use config::AgentLoopConfig;
pub use controller::{AgentLoop, FailureCause, RunReport, RunStatus};
