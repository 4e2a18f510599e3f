//! Error types for the shell client.

use accord_shell_core::ShellError;
use serde::{Deserialize, Serialize};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised while talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<String>,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The request did not finish in time.
    #[error("Request timed out")]
    Timeout,

    /// Login was refused.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Session state could not be read or written.
    #[error(transparent)]
    Shell(#[from] ShellError),
}

impl ClientError {
    /// Build an API error from a status code and response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(error_response) => Self::Api {
                status,
                message: error_response.message,
                details: error_response.details,
            },
            Err(_) => Self::Api {
                status,
                message: body.to_string(),
                details: None,
            },
        }
    }
}

/// Error body returned by the backend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(alias = "error")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_reads_message() {
        let err = ClientError::from_response(401, r#"{"message":"Invalid credentials"}"#);
        assert!(matches!(
            err,
            ClientError::Api { status: 401, ref message, .. } if message == "Invalid credentials"
        ));
    }

    #[test]
    fn test_from_response_accepts_error_field_and_plain_text() {
        let err = ClientError::from_response(503, r#"{"error":"down","details":"maintenance"}"#);
        assert!(matches!(
            err,
            ClientError::Api { ref details, .. } if details.as_deref() == Some("maintenance")
        ));

        let err = ClientError::from_response(502, "Bad Gateway");
        assert_eq!(err.to_string(), "API error (status 502): Bad Gateway");
    }
}
