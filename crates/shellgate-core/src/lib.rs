//! Core abstractions for brokered SSH terminal sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Target` / `Credential` - Connection profiles
//! - `LiveSession` / `AuditRecord` - Session lifetime and its persisted shadow
//! - `AuthToken` - Expiring login tokens
//! - `ShellChannel` - Channel-based handle on a remote shell
//! - Storage and connector traits

pub mod auth;
pub mod error;
pub mod session;
pub mod shell;
pub mod target;
pub mod traits;

pub use auth::AuthToken;
pub use error::{BrokerError, ErrorKind};
pub use session::{AuditFilter, AuditRecord, AuditStatus, LiveSession, SessionHandle, SessionOutcome};
pub use shell::{DEFAULT_CHANNEL_BUFFER, RemoteEnd, ShellChannel, ShellEvent, ShellInput, ShellRequest};
pub use target::{Credential, DEFAULT_SSH_PORT, Target, TargetPatch, TargetSummary};
pub use traits::{
    AuditStore, BrokerStorage, ConnectError, RemoteConnector, StorageError, TargetStore, TokenStore,
};
