//! Knowledge base error types.

use thiserror::Error;

/// Errors from the embedding client, the vector store and the KB builders.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// The embedding API key is not configured.
    #[error("{var} is required; set it in .env")]
    MissingApiKey { var: String },

    /// The embedding endpoint returned a non-2xx status.
    #[error("embedding request failed (HTTP {status}): {body}")]
    HttpError { status: u16, body: String },

    /// The request could not be sent or the response not read.
    #[error("embedding request failed: {reason}")]
    RequestFailed { reason: String },

    /// Fewer embeddings came back than texts were sent.
    #[error("embedding response has {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    /// SQLite failure in the vector store.
    #[error("vector store error: {reason}")]
    StoreError { reason: String },

    /// Reading source documents or media failed.
    #[error("I/O error on {path}: {reason}")]
    IoError { path: String, reason: String },

    /// `media_tags.yaml` could not be parsed.
    #[error("invalid media tag config {path}: {reason}")]
    TagConfigError { path: String, reason: String },
}

impl KnowledgeError {
    /// Whether the failure points at bad or missing credentials.
    pub fn is_credential_error(&self) -> bool {
        match self {
            Self::MissingApiKey { .. } => true,
            Self::HttpError { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::IoError {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for KnowledgeError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StoreError {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for KnowledgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::StoreError {
            reason: format!("metadata serialization: {err}"),
        }
    }
}
