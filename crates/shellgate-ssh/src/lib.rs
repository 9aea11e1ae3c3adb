//! SSH shell connector.
//!
//! Provides:
//! - `SshConnector` - `RemoteConnector` backed by russh
//! - `SshConfig` / `HostKeyPolicy` - connect timeout and host key checking
//! - `known_hosts` parsing

pub mod auth;
pub mod config;
pub mod connector;
pub mod known_hosts;
mod pump;

pub use config::{HostKeyPolicy, SshConfig};
pub use connector::SshConnector;
