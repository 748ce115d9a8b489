use crate::credentials::CredentialError;
use crate::forward::ForwardError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("forwarder: {0}")]
    Forwarder(#[from] ForwardError),
}

impl EngineError {
    /// Prepend context to a `Config` message; other variants pass through.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
