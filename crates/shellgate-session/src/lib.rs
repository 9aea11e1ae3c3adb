//! Session lifecycle, target resolution and storage for shellgate.
//!
//! Provides:
//! - `SessionManager` - Issue handles, track live sessions, finalize audit rows
//! - `TargetRegistry` - Validated CRUD and resolution over stored targets
//! - `AuthSessions` - TTL token table with lazy expiry
//! - Storage implementations (memory, SQLite)

pub mod auth_sessions;
pub mod manager;
pub mod registry;
pub mod resolver;
pub mod storage;

pub use auth_sessions::AuthSessions;
pub use manager::{
    Admission, CreatedSession, ReattachPolicy, SessionConfig, SessionManager, SessionSnapshot,
    SessionState,
};
pub use registry::TargetRegistry;
pub use resolver::{ResolveError, TargetQuery};
