//! Error types for agilesync
//!
//! One error enum covers every failure mode of the bulk sync and the webhook
//! path. Uses thiserror for ergonomic error handling.

use crate::agile::retry::{RetryDecision, RetryableError};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for agilesync operations
pub type Result<T> = std::result::Result<T, AgileSyncError>;

/// Comprehensive error type for agilesync operations
#[derive(Error, Debug)]
pub enum AgileSyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered 404 for the requested resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success provider response
    #[error("JIRA API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Rate limited (retry-after in seconds)
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Payload-shape errors (unknown sprint status, unknown link type, bad dates)
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite state store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output sink errors
    #[error("Pipe error: {0}")]
    Pipe(String),

    /// A pool task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),

    /// An error annotated with the operation that hit it
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<AgileSyncError>,
    },

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl AgileSyncError {
    /// Wrap this error with a description of the failing operation
    pub fn context(self, context: impl Into<String>) -> Self {
        AgileSyncError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the provider reported the resource as missing, looking
    /// through any context wrappers
    pub fn is_not_found(&self) -> bool {
        match self {
            AgileSyncError::NotFound(_) => true,
            AgileSyncError::Http(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            AgileSyncError::Context { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True for payload-shape problems the webhook receiver reports as 400
    pub fn is_payload_error(&self) -> bool {
        match self {
            AgileSyncError::Parse(_) | AgileSyncError::Json(_) => true,
            AgileSyncError::Context { source, .. } => source.is_payload_error(),
            _ => false,
        }
    }
}

/// Extension for annotating results the way `anyhow::Context` does
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}

impl RetryableError for AgileSyncError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            AgileSyncError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    RetryDecision::Retry
                } else if let Some(status) = e.status() {
                    match status.as_u16() {
                        429 => RetryDecision::RetryAfter(Duration::from_secs(60)),
                        500..=599 => RetryDecision::Retry,
                        _ => RetryDecision::NoRetry,
                    }
                } else if e.is_decode() {
                    RetryDecision::NoRetry
                } else {
                    RetryDecision::Retry
                }
            }
            AgileSyncError::Api { status, .. } if (500..=599).contains(status) => {
                RetryDecision::Retry
            }
            AgileSyncError::RateLimited(secs) => {
                RetryDecision::RetryAfter(Duration::from_secs(*secs))
            }
            AgileSyncError::Context { source, .. } => source.retry_decision(),
            _ => RetryDecision::NoRetry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_survives_context() {
        let err = AgileSyncError::NotFound("sprint/1/issue".to_string())
            .context("error fetching sprint 1 issues");
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "error fetching sprint 1 issues: Not found: sprint/1/issue"
        );
    }

    #[test]
    fn test_retry_classification() {
        assert_eq!(
            AgileSyncError::RateLimited(5).retry_decision(),
            RetryDecision::RetryAfter(Duration::from_secs(5))
        );
        assert_eq!(
            AgileSyncError::Api {
                status: 503,
                message: "unavailable".into()
            }
            .retry_decision(),
            RetryDecision::Retry
        );
        assert_eq!(
            AgileSyncError::NotFound("x".into()).retry_decision(),
            RetryDecision::NoRetry
        );
        assert_eq!(
            AgileSyncError::Parse("bad".into()).retry_decision(),
            RetryDecision::NoRetry
        );
    }

    #[test]
    fn test_payload_error() {
        assert!(AgileSyncError::Parse("x".into()).is_payload_error());
        assert!(AgileSyncError::Parse("x".into())
            .context("sprint_updated")
            .is_payload_error());
        assert!(!AgileSyncError::Pipe("x".into()).is_payload_error());
    }
}
