use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A single file that could not be read into a [`crate::types::Document`].
///
/// Load failures are isolated: the scan records them and moves on.
#[derive(Debug, Clone, Error)]
#[error("cannot load {}: {reason}", path.display())]
pub struct LoadError {
    pub path: PathBuf,
    pub reason: String,
}

impl LoadError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self { path: path.into(), reason: reason.into() }
    }
}

/// Content that is malformed for its format (e.g. broken JSON).
#[derive(Debug, Clone, Error)]
#[error("cannot split {}: {reason}", path.display())]
pub struct SplitError {
    pub path: PathBuf,
    pub reason: String,
}

impl SplitError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self { path: path.into(), reason: reason.into() }
    }
}

/// Failure of a call to an external embedding or generation service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("rate limited")]
    RateLimited,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("service unavailable (status {0})")]
    Unavailable(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected (status {0})")]
    Auth(u16),

    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Rate limits, timeouts, 5xx and transport failures may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Timeout(_) | Self::Unavailable(_) | Self::Transport(_)
        )
    }

    /// Classify an HTTP status that is not a success.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::Auth(status),
            500..=599 => Self::Unavailable(status),
            _ => Self::Rejected { status, message: truncate(body, 200) },
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("embedding failed: {0}")]
    Embedding(#[source] ServiceError),

    #[error("generation failed: {0}")]
    Generation(#[source] ServiceError),

    #[error("{operation} timed out after {attempts} attempt(s)")]
    Timeout { operation: &'static str, attempts: u32 },

    #[error("index schema mismatch: {0}")]
    IndexSchema(String),

    #[error("embedding model mismatch: index was built with '{index_model}', query embedder is '{query_model}'")]
    ModelMismatch { index_model: String, query_model: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Errors that abort the whole operation rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IndexSchema(_) | Self::ModelMismatch { .. } | Self::InvalidConfig(_) | Self::Storage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(ServiceError::from_status(429, ""), ServiceError::RateLimited);
        assert_eq!(ServiceError::from_status(401, ""), ServiceError::Auth(401));
        assert_eq!(ServiceError::from_status(503, ""), ServiceError::Unavailable(503));
        assert!(matches!(ServiceError::from_status(400, "bad"), ServiceError::Rejected { status: 400, .. }));
    }

    #[test]
    fn transient_vs_terminal() {
        assert!(ServiceError::RateLimited.is_transient());
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ServiceError::Transport("reset".into()).is_transient());
        assert!(!ServiceError::Auth(401).is_transient());
        assert!(!ServiceError::Malformed("x".into()).is_transient());
    }

    #[test]
    fn rejected_body_is_truncated() {
        let body = "x".repeat(500);
        let ServiceError::Rejected { message, .. } = ServiceError::from_status(422, &body) else {
            panic!("expected Rejected");
        };
        assert!(message.chars().count() <= 201);
    }
}
