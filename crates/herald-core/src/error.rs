use thiserror::Error;

/// Top-level error type for Herald.
#[derive(Debug, Error)]
pub enum HeraldError {
    /// Error from a completion provider.
    #[error("provider error: {0}")]
    Provider(String),

    /// Error from a messaging channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Error from an external query source (e.g. arXiv).
    #[error("query error: {0}")]
    Query(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Storage error (quota table, snapshot files).
    #[error("storage error: {0}")]
    Storage(String),

    /// The inbound message type has no conversation identity.
    #[error("unsupported conversation type: {0}")]
    UnsupportedConversationType(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
