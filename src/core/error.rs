//! Error types for scheduler operations.

use std::time::Duration;

use thiserror::Error;

use super::classify::{ErrorCategory, Severity};

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration could not be read or failed validation.
    #[error("config error: {0}")]
    Config(String),
    /// Host metrics could not be sampled.
    #[error("metrics error: {0}")]
    Metrics(String),
    /// The roster file is missing or malformed.
    #[error("roster error: {0}")]
    Roster(String),
    /// The worker pool rejected or lost work.
    #[error("pool error: {0}")]
    Pool(String),
    /// The session executor could not be started or closed.
    #[error("executor error: {0}")]
    Executor(String),
}

/// Failure reported by one attempt of a unit of work.
///
/// `kind` is the declared type name of the failure (for example
/// `TimeoutException`) and `message` its free-form text; both feed the
/// classifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    /// Declared type name.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl Failure {
    /// Create a failure from a type name and message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Wrap any error value, using the last path segment of its type name as kind.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        let full = std::any::type_name::<E>();
        let base = full.split('<').next().unwrap_or(full);
        let kind = base.rsplit("::").next().unwrap_or(base);
        Self::new(kind, err.to_string())
    }

    /// Failure produced when an attempt exceeds its deadline.
    #[must_use]
    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            "AttemptTimeout",
            format!("timeout: attempt exceeded {:.1}s", limit.as_secs_f64()),
        )
    }

    /// Parse a `Kind: message` line; lines without a kind prefix become `Unknown`.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.split_once(':') {
            Some((kind, message))
                if !kind.is_empty()
                    && kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') =>
            {
                Self::new(kind, message.trim())
            }
            _ => Self::new("Unknown", line),
        }
    }
}

/// Terminal outcome of a retried operation.
#[derive(Debug, Clone, Error)]
#[error(
    "{operation} failed after {attempts} attempt(s) [{category}/{severity}{}]: {failure}",
    escalated_suffix(*.escalated)
)]
pub struct RetryError {
    /// Name of the operation that failed.
    pub operation: String,
    /// Last failure observed.
    pub failure: Failure,
    /// Category of the last failure.
    pub category: ErrorCategory,
    /// Severity of the last failure.
    pub severity: Severity,
    /// Number of attempts made.
    pub attempts: u32,
    /// Retrying stopped because a retry failed more severely than the first attempt.
    pub escalated: bool,
}

const fn escalated_suffix(escalated: bool) -> &'static str {
    if escalated {
        ", escalated"
    } else {
        ""
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display() {
        let f = Failure::new("ConnectionError", "refused");
        assert_eq!(f.to_string(), "ConnectionError: refused");
    }

    #[test]
    fn from_error_uses_short_type_name() {
        let err = std::io::Error::other("disk gone");
        let f = Failure::from_error(&err);
        assert_eq!(f.kind, "Error");
        assert_eq!(f.message, "disk gone");
    }

    #[test]
    fn parse_kind_prefix() {
        let f = Failure::parse("NoSuchElementException: #login missing");
        assert_eq!(f.kind, "NoSuchElementException");
        assert_eq!(f.message, "#login missing");

        let f = Failure::parse("something broke: badly");
        assert_eq!(f.kind, "Unknown");
        assert_eq!(f.message, "something broke: badly");
    }

    #[test]
    fn timeout_failure_mentions_timeout() {
        let f = Failure::timeout(Duration::from_secs(3));
        assert!(f.message.starts_with("timeout"));
    }

    #[test]
    fn retry_error_display() {
        let err = RetryError {
            operation: "session:a".into(),
            failure: Failure::new("ConnectionError", "refused"),
            category: ErrorCategory::Network,
            severity: Severity::Medium,
            attempts: 4,
            escalated: false,
        };
        assert_eq!(
            err.to_string(),
            "session:a failed after 4 attempt(s) [network/medium]: ConnectionError: refused"
        );
    }
}
