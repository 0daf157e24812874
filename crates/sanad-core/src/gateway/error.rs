//! Gateway error handling
//!
//! Typed errors for backend calls, with retry classification used by the
//! feed and board layers.

use thiserror::Error;

/// Errors that can occur while talking to the backend
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Request never reached the backend (DNS, TLS, timeout, ...)
    #[error("Could not reach backend: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Backend rejected request ({status}): {message}")]
    Backend { status: u16, message: String },

    /// Backend unavailable (used by the in-memory gateway to simulate outages)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Response body could not be decoded
    #[error("Unexpected response from backend: {0}")]
    Decode(String),

    /// Query used a column or value the gateway cannot express
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Row addressed by id does not exist
    #[error("No row '{id}' in table '{table}'")]
    NotFound { table: String, id: String },

    /// Local SQLite store failed
    #[error("Local store error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Push channel could not be opened or was dropped
    #[error("Push channel error: {0}")]
    Channel(String),
}

impl GatewayError {
    /// Whether a user-initiated retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_)
            | GatewayError::Unavailable(_)
            | GatewayError::Channel(_) => true,
            GatewayError::Backend { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        GatewayError::Decode(error.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        GatewayError::Channel(error.to_string())
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(GatewayError::Unavailable("down".into()).is_retryable());
        assert!(GatewayError::Backend {
            status: 503,
            message: "maintenance".into()
        }
        .is_retryable());
        assert!(!GatewayError::Backend {
            status: 400,
            message: "bad column".into()
        }
        .is_retryable());
        assert!(!GatewayError::InvalidQuery("x".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::NotFound {
            table: "comments".into(),
            id: "c1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("comments"));
        assert!(msg.contains("c1"));
    }
}
