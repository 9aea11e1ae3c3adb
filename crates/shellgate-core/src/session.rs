//! Live sessions and their persisted audit shadow.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Target;

/// Opaque, single-issue session handle.
pub type SessionHandle = Uuid;

/// Audit status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Session created and not yet terminated.
    Connected,
    /// Session ended normally.
    Disconnected,
    /// Session ended with an error.
    Error,
}

impl AuditStatus {
    /// Wire/storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }

    /// Whether this status ends a session.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Connected)
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown audit status: {other}")),
        }
    }
}

/// How a session ended. Only terminal statuses can be written at finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Disconnected,
    Error,
}

impl From<SessionOutcome> for AuditStatus {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Disconnected => Self::Disconnected,
            SessionOutcome::Error => Self::Error,
        }
    }
}

/// In-memory record of an issued session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSession {
    pub handle: SessionHandle,
    pub target_id: String,
    /// Free-text audit note supplied by the caller.
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl LiveSession {
    /// Create a session record stamped now.
    #[must_use]
    pub fn new(handle: SessionHandle, target_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            handle,
            target_id: target_id.into(),
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }
}

/// Persisted history of one session.
///
/// Target fields are copied at creation so later profile edits do not
/// rewrite history. `end_time` is set iff `status` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: SessionHandle,
    pub target_id: String,
    pub target_name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: AuditStatus,
    pub reason: String,
}

impl AuditRecord {
    /// Opening record for a freshly created session.
    #[must_use]
    pub fn opened(session: &LiveSession, target: &Target) -> Self {
        Self {
            id: session.handle,
            target_id: target.id.clone(),
            target_name: target.name().to_string(),
            host: target.host.clone(),
            port: target.port,
            username: target.username.clone(),
            start_time: session.created_at,
            end_time: None,
            status: AuditStatus::Connected,
            reason: session.reason.clone(),
        }
    }

    /// Write the terminal status. The first terminal write wins.
    ///
    /// Returns `true` if the record changed.
    pub fn close(&mut self, end_time: DateTime<Utc>, outcome: SessionOutcome) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = outcome.into();
        self.end_time = Some(end_time);
        true
    }
}

/// Audit query filter.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Filter by target.
    pub target_id: Option<String>,
    /// Filter by status.
    pub status: Option<AuditStatus>,
    /// Limit results.
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Whether a record passes this filter (limit aside).
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(ref target_id) = self.target_id {
            if record.target_id != *target_id {
                return false;
            }
        }
        true
    }
}
