//! Result and error types for covdiff.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for covdiff operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur in the agent and its channel helpers
#[derive(Debug, Error)]
pub enum AgentError {
    /// Invalid or unparsable configuration value
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// A Unix socket could not be bound
    #[error("Failed to bind socket {}: {source}", path.display())]
    Bind {
        /// Socket path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Control protocol violation (bad command line, missing ACK)
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// The agent's background runtime could not be started or has stopped
    #[error("Agent runtime error: {message}")]
    Runtime {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding or decoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl AgentError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a protocol error
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a runtime error
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Create a bind error for the given socket path
    #[must_use]
    pub fn bind(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Bind {
            path: path.into(),
            source,
        }
    }

    /// Create a timeout error from a duration
    #[must_use]
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout {
            ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_config_error() {
        let err = AgentError::config("COVDIFF_QUIESCE_WAIT_MS must be an integer");
        assert!(err.to_string().contains("Configuration"));
        assert!(err.to_string().contains("COVDIFF_QUIESCE_WAIT_MS"));
    }

    #[test]
    fn test_bind_error_names_path() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err = AgentError::bind("/tmp/control.sock", io);
        assert!(err.to_string().contains("/tmp/control.sock"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_timeout_from_duration() {
        let err = AgentError::timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Operation timed out after 1500ms");
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "socket not found");
        let err: AgentError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }

    #[test]
    fn test_json_error_from() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: AgentError = json_err.into();
        assert!(err.to_string().starts_with("JSON error"));
    }
}
