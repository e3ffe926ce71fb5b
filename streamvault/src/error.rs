//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Recording already active for streamer {0}")]
    RecordingAlreadyActive(String),

    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Proxy unreachable: {0}")]
    ProxyUnreachable(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Remux failed: {0}")]
    RemuxFailed(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Chapters error: {0}")]
    Chapters(String),

    #[error("Thumbnail error: {0}")]
    Thumbnail(String),

    #[error("Cleanup error: {0}")]
    Cleanup(String),

    #[error("Cross-streamer path: recording for {streamer} points into {path}")]
    CrossStreamerPath { streamer: String, path: String },

    #[error("Twitch API error: {0}")]
    TwitchApi(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Task cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Whether a pipeline step failure with this error may be retried by
    /// the job queue. Cross-streamer path mismatches are always terminal.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::CrossStreamerPath { .. }
                | Self::Validation(_)
                | Self::Configuration(_)
                | Self::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_helper() {
        let err = Error::not_found("Streamer", "42");
        assert!(err.to_string().contains("Streamer"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_cross_streamer_path_is_terminal() {
        let err = Error::CrossStreamerPath {
            streamer: "eve".to_string(),
            path: "/recordings/frank".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(Error::RemuxFailed("boom".to_string()).is_retryable());
    }
}
