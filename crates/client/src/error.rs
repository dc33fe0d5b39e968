//! Client error types
//!
//! Realtime failures (connect errors, unexpected closes, malformed frames,
//! sends while disconnected) are absorbed inside the connection layer and never
//! reach callers as errors. What remains here is what a caller can act on:
//! REST collaborator failures and endpoint construction.

/// Error type for support chat client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Missing credentials")]
    Unauthenticated,
}

impl ClientError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            // Network-level failures and server-side hiccups
            ClientError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ClientError::Status(code) => *code >= 500 || *code == 429,
            ClientError::Transport(_) => true,

            // Don't retry permanent errors
            ClientError::Json(_) => false,
            ClientError::UnsupportedScheme(_) => false,
            ClientError::Unauthenticated => false,
        }
    }
}

/// Result type for support chat client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ClientError::Status(503).is_transient());
        assert!(ClientError::Status(429).is_transient());
        assert!(!ClientError::Status(401).is_transient());
        assert!(!ClientError::Status(404).is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(!ClientError::Unauthenticated.is_transient());
        assert!(!ClientError::UnsupportedScheme("ftp".to_string()).is_transient());
        assert!(ClientError::Transport("reset".to_string()).is_transient());
    }
}
