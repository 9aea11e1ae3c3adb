//! Channel-based handle on a remote interactive shell.
//!
//! A connector hands back a [`ShellChannel`]: a receiver of remote events
//! and a sender for input. The connector keeps the other half
//! ([`RemoteEnd`]) and pumps it against the real transport. Dropping the
//! input sender is the close signal for the remote side.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{Credential, Target};

/// Default buffer depth for shell channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Everything needed to open a shell on a remote host.
#[derive(Debug, Clone)]
pub struct ShellRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Option<Credential>,
    /// Terminal type requested for the PTY.
    pub term: String,
    pub cols: u16,
    pub rows: u16,
}

impl ShellRequest {
    /// Build a request from a target profile with an 80x24 PTY.
    #[must_use]
    pub fn for_target(target: &Target) -> Self {
        Self {
            host: target.host.clone(),
            port: target.port,
            username: target.username.clone(),
            credential: target.credential(),
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
        }
    }

    /// Set terminal type.
    #[must_use]
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    /// Set PTY dimensions.
    #[must_use]
    pub const fn dimensions(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }
}

/// Event coming from the remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// Output chunk (stdout and stderr are merged).
    Data(Bytes),
    /// Protocol-level failure; the channel is unusable afterwards.
    Error(String),
    /// Remote end closed the channel.
    Closed,
}

/// Input going to the remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellInput {
    Data(Bytes),
    Resize { cols: u16, rows: u16 },
}

/// Caller-side half of an open shell.
#[derive(Debug)]
pub struct ShellChannel {
    pub events: mpsc::Receiver<ShellEvent>,
    pub input: mpsc::Sender<ShellInput>,
}

/// Connector-side half of an open shell.
#[derive(Debug)]
pub struct RemoteEnd {
    pub events: mpsc::Sender<ShellEvent>,
    pub input: mpsc::Receiver<ShellInput>,
}

impl ShellChannel {
    /// Create a connected pair of halves.
    #[must_use]
    pub fn pair(buffer: usize) -> (Self, RemoteEnd) {
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let (input_tx, input_rx) = mpsc::channel(buffer);
        (
            Self {
                events: event_rx,
                input: input_tx,
            },
            RemoteEnd {
                events: event_tx,
                input: input_rx,
            },
        )
    }
}
