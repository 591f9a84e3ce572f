/*
[INPUT]:  Error sources (HTTP, API, auth, signing, validation, WebSocket, serde)
[OUTPUT]: Structured error type with retry and auth hints
[POS]:    Error handling layer - unified error type for the entire crate
[UPDATE]: When adding new error sources or changing propagation policy
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the GRVT adapter
#[derive(Error, Debug)]
pub enum GrvtError {
    /// HTTP request failed below the API layer
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status
    #[error("API error [{status}] {method} {path}: {body}")]
    Api {
        status: u16,
        method: String,
        path: String,
        body: String,
    },

    /// Login or session refresh failed
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Private key material is missing or malformed, or the signer failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// Order or leg data rejected at construction
    #[error("Validation error: {0}")]
    Validation(String),

    /// Stream transport dropped or could not be opened
    #[error("Transport error: {0}")]
    Transport(String),

    /// A single stream payload did not match the subscribed type
    #[error("Deserialization failed on channel {channel}: {source}")]
    Deserialization {
        channel: String,
        #[source]
        source: serde_json::Error,
    },

    /// A subscriber callback failed or panicked
    #[error("Handler failed on channel {channel}: {message}")]
    Handler { channel: String, message: String },

    /// A bounded network operation did not finish in time
    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The client was shut down
    #[error("Client is closed")]
    Closed,
}

impl GrvtError {
    /// Check if the error is worth retrying at the request level
    pub fn is_retryable(&self) -> bool {
        match self {
            GrvtError::Http(err) => err.is_connect() || err.is_timeout(),
            GrvtError::Api { status, .. } => is_retryable_status(*status),
            GrvtError::Timeout { .. } | GrvtError::Transport(_) => true,
            _ => false,
        }
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        match self {
            GrvtError::Authentication { .. } => true,
            GrvtError::Api { status, .. } => *status == StatusCode::UNAUTHORIZED.as_u16(),
            _ => false,
        }
    }

    /// Create an API error from status code and response body
    pub fn api(
        status: StatusCode,
        method: impl Into<String>,
        path: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        GrvtError::Api {
            status: status.as_u16(),
            method: method.into(),
            path: path.into(),
            body: body.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        GrvtError::Authentication {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        GrvtError::Validation(message.into())
    }

    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        GrvtError::Timeout {
            operation: operation.into(),
            millis: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// HTTP statuses the REST surface retries with backoff
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for GRVT operations
pub type Result<T> = std::result::Result<T, GrvtError>;
