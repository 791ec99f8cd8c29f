//! Error taxonomy for the impact pipeline.
//!
//! Three tiers of failure exist in this system:
//! - transient clone failures are retried inside the workspace manager and
//!   never surface past the retry bound;
//! - fatal-per-consumer errors ([`ImpactError::Acquire`] through
//!   [`ImpactError::StreamRead`]) abort one consumer and leave the batch
//!   running;
//! - tolerated outcomes (non-zero test-runner exit, malformed stream lines)
//!   are absorbed into the data model and never raised at all.

use thiserror::Error;

/// Errors produced by the impact pipeline.
#[derive(Debug, Error)]
pub enum ImpactError {
    #[error("failed to acquire workspace for {url}: {message}")]
    Acquire { url: String, message: String },

    #[error("failed to reset workspace: {0}")]
    Reset(String),

    #[error("failed to inject candidate module: {0}")]
    Inject(String),

    #[error("failed to launch test runner: {0}")]
    Launch(String),

    #[error("failed to read test output stream: {0}")]
    StreamRead(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for impact pipeline operations.
pub type Result<T> = std::result::Result<T, ImpactError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_error_display() {
        let err = ImpactError::Acquire {
            url: "https://example.com/org/repo".to_string(),
            message: "git clone exited with 128".to_string(),
        };
        assert!(err.to_string().contains("failed to acquire workspace"));
        assert!(err.to_string().contains("https://example.com/org/repo"));
    }

    #[test]
    fn test_consumer_fatal_error_display() {
        let err = ImpactError::Reset("git checkout exited with 1".to_string());
        assert!(err.to_string().contains("failed to reset workspace"));

        let err = ImpactError::Inject("go mod tidy exited with 1".to_string());
        assert!(err.to_string().contains("failed to inject candidate module"));

        let err = ImpactError::Launch("no such file or directory".to_string());
        assert!(err.to_string().contains("failed to launch test runner"));
    }

    #[test]
    fn test_stream_read_error_display() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = ImpactError::StreamRead(io);
        assert!(err.to_string().contains("failed to read test output stream"));
    }
}
