//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;

/// Errors that can occur during agent core operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Session file could not be read or written.
    #[error("session storage error: {reason}")]
    StorageError { reason: String },

    /// Session file exists but does not parse.
    #[error("malformed session '{session_id}': {reason}")]
    MalformedSession { session_id: String, reason: String },

    /// Tool execution failed (transport, server, or local tool error).
    #[error("{reason}")]
    ToolExecutionError { reason: String },

    /// The model requested a tool that is not in the catalog.
    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },

    /// Tool arguments were missing or of the wrong shape.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::StorageError {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}

/// Errors that abort a single user turn.
///
/// The session log keeps the user input; only the in-flight working prompt
/// is discarded.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The model call failed.
    #[error("model call failed: {0}")]
    ModelCall(#[from] InferenceError),

    /// The model kept requesting tools past the per-turn cycle limit.
    #[error("tool round limit exceeded: model still requesting tools after {limit} rounds")]
    RoundLimitExceeded { limit: usize },
}
