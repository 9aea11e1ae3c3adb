//! Core traits for storage and remote connections.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{AuditFilter, AuditRecord, AuthToken, SessionHandle, SessionOutcome, ShellChannel, ShellRequest, Target};

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    Conflict(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Persisted target profiles.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// All targets, ordered by id.
    async fn list_targets(&self) -> Result<Vec<Target>, StorageError>;

    /// Get a target by id.
    async fn get_target(&self, id: &str) -> Result<Option<Target>, StorageError>;

    /// Insert a new target. Fails with `Conflict` if the id is taken.
    async fn insert_target(&self, target: &Target) -> Result<(), StorageError>;

    /// Replace an existing target. Fails with `NotFound` if absent.
    async fn update_target(&self, target: &Target) -> Result<(), StorageError>;

    /// Delete a target. Returns whether a row was removed.
    async fn delete_target(&self, id: &str) -> Result<bool, StorageError>;
}

/// Persisted session audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Insert the opening record of a session.
    async fn insert_audit(&self, record: &AuditRecord) -> Result<(), StorageError>;

    /// Get a record by session handle.
    async fn get_audit(&self, id: SessionHandle) -> Result<Option<AuditRecord>, StorageError>;

    /// Write the terminal status if the record is still `connected`.
    ///
    /// Returns whether the write was applied; a record that already ended
    /// is left untouched.
    async fn finalize_audit(
        &self,
        id: SessionHandle,
        end_time: DateTime<Utc>,
        outcome: SessionOutcome,
    ) -> Result<bool, StorageError>;

    /// List records, newest first.
    async fn list_audit(&self, filter: AuditFilter) -> Result<Vec<AuditRecord>, StorageError>;
}

/// Persisted auth tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert or replace a token.
    async fn put_token(&self, token: &AuthToken) -> Result<(), StorageError>;

    /// Raw read, no expiry check.
    async fn get_token(&self, token: &str) -> Result<Option<AuthToken>, StorageError>;

    /// Delete a token. Returns whether a row was removed.
    async fn delete_token(&self, token: &str) -> Result<bool, StorageError>;

    /// Delete every token with `expires_at <= now`. Returns the count removed.
    async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// A backend serving every store the broker needs.
pub trait BrokerStorage: TargetStore + AuditStore + TokenStore {}

impl<T> BrokerStorage for T where T: TargetStore + AuditStore + TokenStore {}

/// Remote connection error.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Cannot reach {address}: {reason}")]
    Unreachable { address: String, reason: String },
    #[error("Authentication failed for {user}")]
    AuthenticationFailed { user: String },
    #[error("Host key rejected for {host}")]
    HostKeyRejected { host: String },
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
    #[error("Channel error: {0}")]
    Channel(String),
    #[error("Invalid private key: {0}")]
    InvalidKey(String),
}

/// Capability to open an authenticated interactive shell.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Connect, authenticate and start a shell with a PTY.
    async fn open_shell(&self, request: &ShellRequest) -> Result<ShellChannel, ConnectError>;
}
