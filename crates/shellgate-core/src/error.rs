//! Caller-facing error type.

use serde::Serialize;
use thiserror::Error;

use crate::{ConnectError, StorageError};

/// Error kind with a stable machine-readable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Ambiguous,
    Validation,
    UpstreamUnavailable,
    AuthenticationFailed,
    Timeout,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Ambiguous => "ambiguous",
            Self::Validation => "validation_error",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::AuthenticationFailed => "authentication_failed",
            Self::Timeout => "timeout",
        }
    }
}

/// Error surfaced to callers of the broker.
///
/// Every failure is scoped to one target, one session or one resolution
/// attempt; none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{what} not found{}", suggestion_suffix(.suggestions))]
    NotFound {
        what: String,
        /// Known alternatives, rendered `name (id)`.
        suggestions: Vec<String>,
    },
    #[error("\"{query}\" matches more than one target: {}", .candidates.join(", "))]
    Ambiguous { query: String, candidates: Vec<String> },
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Timed out: {0}")]
    Timeout(String),
}

fn suggestion_suffix(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(". Available targets: {}", suggestions.join(", "))
    }
}

impl BrokerError {
    /// `NotFound` without suggestions.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            suggestions: Vec::new(),
        }
    }

    /// Kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Ambiguous { .. } => ErrorKind::Ambiguous,
            Self::Validation(_) => ErrorKind::Validation,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

impl From<StorageError> for BrokerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => Self::not_found(what),
            StorageError::Conflict(what) => Self::Validation(format!("{what} already exists")),
            StorageError::Unavailable(reason) | StorageError::Internal(reason) => {
                Self::UpstreamUnavailable(reason)
            }
        }
    }
}

impl From<ConnectError> for BrokerError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::AuthenticationFailed { .. } => Self::AuthenticationFailed(err.to_string()),
            ConnectError::Timeout(_) => Self::Timeout(err.to_string()),
            ConnectError::InvalidKey(_) => Self::Validation(err.to_string()),
            ConnectError::Unreachable { .. }
            | ConnectError::HostKeyRejected { .. }
            | ConnectError::Channel(_) => Self::UpstreamUnavailable(err.to_string()),
        }
    }
}
