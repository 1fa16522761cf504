//! Reasoning-service adapters.

mod openai;

pub use openai::OpenAiReasoner;
