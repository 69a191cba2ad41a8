//! Inference error types.
//!
//! Structured logging is the caller's responsibility; these types carry the
//! context needed to build meaningful log entries.

use thiserror::Error;

/// Errors that can occur during inference operations.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body was not a valid completion.
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// Client construction or configuration error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Whether the endpoint rejected the credentials (HTTP 401/403).
    pub fn is_auth_error(&self) -> bool {
        matches!(self, InferenceError::HttpError { status: 401 | 403, .. })
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_auth_error() {
        let err = InferenceError::HttpError {
            status: 401,
            body: "Authentication Fails".into(),
        };
        assert!(err.is_auth_error());
        assert!(!InferenceError::HttpError {
            status: 500,
            body: String::new()
        }
        .is_auth_error());
    }

    #[test]
    fn test_error_body() {
        let err = InferenceError::HttpError {
            status: 400,
            body: "bad request".into(),
        };
        assert_eq!(err.error_body(), Some("bad request"));
        assert!(InferenceError::Timeout { duration_secs: 5 }.error_body().is_none());
    }
}
