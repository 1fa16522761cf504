use thiserror::Error;

/// Errors emitted by the session registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The browser session failed to initialize. Fatal to the calling
    /// operation; the registry entry is evicted and nothing is retried.
    #[error("session initialization failed: {0}")]
    Init(String),
}

impl RegistryError {
    pub fn init(message: impl ToString) -> Self {
        Self::Init(message.to_string())
    }
}
