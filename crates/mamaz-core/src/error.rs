use thiserror::Error;

/// Top-level error type for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or malformed configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Webhook backend call failed.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// Error from the external automation client.
    #[error("automation error: {0}")]
    Automation(String),

    /// Session lifecycle precondition failed.
    #[error("session error: {0}")]
    Session(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
