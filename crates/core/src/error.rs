//! Error types shared by the shell core.

/// Result type for shell core operations.
pub type ShellResult<T> = Result<T, ShellError>;

/// Errors raised by the shell core.
///
/// Most session paths are best-effort and only log these; they surface to
/// callers for configuration loading and storage access.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Persisted key/value storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Shell configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The URL has an opaque origin and cannot host a browsing context.
    #[error("Unsupported origin: {0}")]
    UnsupportedOrigin(String),

    /// An embedded frame could not be opened or messaged.
    #[error("Frame error: {0}")]
    Frame(String),
}

impl From<anyhow::Error> for ShellError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

impl ShellError {
    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
