//! Caller-to-remote bridge and transports.
//!
//! Provides:
//! - Frame model and control messages
//! - `Bridge` - attach a caller transport to a session's remote shell
//! - WebSocket transport (feature: websocket)

pub mod bridge;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use bridge::{Bridge, BridgeConfig, BridgeExit};
pub use protocol::{ControlMessage, Frame};
