//! Error types for LeadScout.
//!
//! Library crates use [`LeadScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LeadScout operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadScoutError {
    /// Configuration loading or validation error. Fatal at startup.
    #[error("config error: {message}")]
    Config { message: String },

    /// A provider call failed in a way that is expected to succeed on retry
    /// (timeout, connection reset, rate limit, 5xx).
    #[error("{provider}: transient failure: {message}")]
    Transient { provider: String, message: String },

    /// A provider call failed permanently (4xx other than 429, malformed body).
    #[error("{provider}: {message}")]
    Provider { provider: String, message: String },

    /// The retry policy gave up on a transient failure.
    #[error("{operation}: gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<LeadScoutError>,
    },

    /// A model response could not be parsed or did not match the requested schema.
    #[error("extraction error: {message}")]
    Extraction { message: String },

    /// Writing an export file failed. Fatal to the run.
    #[error("export error at {path:?}: {message}")]
    Export { path: PathBuf, message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Operator prompt failed or was aborted.
    #[error("interaction error: {0}")]
    Interaction(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadScoutError>;

impl LeadScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a transient provider error.
    pub fn transient(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a permanent provider error.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create an extraction error from any displayable message.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction {
            message: msg.into(),
        }
    }

    /// Create an export error for `path`.
    pub fn export(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Export {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify an HTTP status returned by `provider`.
    ///
    /// 429 and 5xx are transient; every other non-success status is permanent.
    pub fn from_status(provider: impl Into<String>, status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let message = format!("HTTP {status}: {snippet}");
        if status == 429 || (500..600).contains(&status) {
            Self::transient(provider, message)
        } else {
            Self::provider(provider, message)
        }
    }

    /// Whether the retry policy should re-invoke the failed call.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LeadScoutError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = LeadScoutError::transient("serpapi", "timed out");
        assert_eq!(err.to_string(), "serpapi: transient failure: timed out");
    }

    #[test]
    fn status_classification() {
        assert!(LeadScoutError::from_status("brave", 429, "slow down").is_transient());
        assert!(LeadScoutError::from_status("brave", 503, "").is_transient());
        assert!(!LeadScoutError::from_status("brave", 401, "bad key").is_transient());
        assert!(!LeadScoutError::from_status("brave", 404, "").is_transient());
    }

    #[test]
    fn exhausted_wraps_source() {
        let err = LeadScoutError::RetriesExhausted {
            operation: "search".into(),
            attempts: 3,
            source: Box::new(LeadScoutError::transient("serpapi", "HTTP 502")),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("gave up after 3 attempts"));
    }
}
