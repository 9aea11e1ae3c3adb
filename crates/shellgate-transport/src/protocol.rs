//! Frame model shared by every caller transport.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Longest close reason a WebSocket close frame can carry, in bytes.
pub const MAX_CLOSE_REASON: usize = 123;

/// One message on a caller transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    /// Close with an optional reason.
    Close(Option<String>),
}

impl Frame {
    /// Close frame whose reason is cut to [`MAX_CLOSE_REASON`] bytes on a
    /// character boundary.
    #[must_use]
    pub fn close(reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.len() > MAX_CLOSE_REASON {
            let mut end = MAX_CLOSE_REASON;
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason.truncate(end);
        }
        Self::Close(Some(reason))
    }
}

/// Control message a caller may send as a text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Resize the remote PTY.
    Resize { cols: u16, rows: u16 },
}

impl ControlMessage {
    /// Parse a text frame as a control message.
    ///
    /// Anything that is not exactly a control object is terminal input.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        if !text.trim_start().starts_with('{') {
            return None;
        }
        match serde_json::from_str(text) {
            Ok(Self::Resize { cols, rows }) if cols > 0 && rows > 0 => {
                Some(Self::Resize { cols, rows })
            }
            _ => None,
        }
    }
}
