//! Live proxy between a caller transport and a remote shell.
//!
//! One [`Bridge::attach`] call drives one attachment from admission to
//! release: `Connecting -> Ready -> Closed`. Remote output is forwarded
//! verbatim as binary frames; caller text and binary frames are forwarded
//! verbatim as input, except resize control messages.

use std::{pin::Pin, sync::Arc};

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt, pin_mut};
use shellgate_core::{
    RemoteConnector, SessionHandle, SessionOutcome, ShellChannel, ShellEvent, ShellInput,
    ShellRequest,
    traits::{AuditStore, TargetStore},
};
use shellgate_session::SessionManager;
use tokio::sync::mpsc;

use crate::protocol::{ControlMessage, Frame};

/// Remote shell parameters for every attach.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub term: String,
    pub cols: u16,
    pub rows: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    #[must_use]
    pub const fn dimensions(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }
}

/// How an attachment ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeExit {
    /// Admission refused; nothing was recorded.
    Rejected(String),
    /// The remote shell could not be opened.
    ConnectFailed(String),
    RemoteClosed,
    RemoteError(String),
    /// Close frame, end of stream or a failed write to the caller.
    CallerClosed,
}

impl BridgeExit {
    /// Audit outcome of an admitted attachment.
    #[must_use]
    pub const fn outcome(&self) -> Option<SessionOutcome> {
        match self {
            Self::Rejected(_) => None,
            Self::ConnectFailed(_) | Self::RemoteError(_) => Some(SessionOutcome::Error),
            Self::RemoteClosed | Self::CallerClosed => Some(SessionOutcome::Disconnected),
        }
    }
}

/// Attaches caller transports to brokered sessions.
pub struct Bridge<S: ?Sized, C: ?Sized> {
    manager: Arc<SessionManager<S>>,
    connector: Arc<C>,
    config: BridgeConfig,
}

impl<S: ?Sized, C: ?Sized> Clone for Bridge<S, C> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            connector: Arc::clone(&self.connector),
            config: self.config.clone(),
        }
    }
}

impl<S, C> Bridge<S, C>
where
    S: TargetStore + AuditStore + ?Sized,
    C: RemoteConnector + ?Sized,
{
    #[must_use]
    pub const fn new(
        manager: Arc<SessionManager<S>>,
        connector: Arc<C>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            manager,
            connector,
            config,
        }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<SessionManager<S>> {
        &self.manager
    }

    /// Run one attachment to completion.
    ///
    /// `tx` carries frames to the caller and `rx` frames from it. Returns
    /// once either side has closed and the session has been released.
    pub async fn attach<Tx, Rx>(&self, handle: SessionHandle, tx: Tx, rx: Rx) -> BridgeExit
    where
        Tx: Sink<Frame>,
        Rx: Stream<Item = Frame>,
    {
        pin_mut!(tx);
        pin_mut!(rx);

        let admission = match self.manager.admit(handle).await {
            Ok(admission) => admission,
            Err(e) => {
                tracing::debug!(%handle, error = %e, "Attach refused");
                let reason = e.to_string();
                let _ = tx.send(Frame::close(reason.as_str())).await;
                return BridgeExit::Rejected(reason);
            }
        };

        let target = &admission.target;
        let request = ShellRequest::for_target(target)
            .term(self.config.term.as_str())
            .dimensions(self.config.cols, self.config.rows);

        let shell = match self.connector.open_shell(&request).await {
            Ok(shell) => shell,
            Err(e) => {
                tracing::warn!(%handle, target_id = %target.id, error = %e, "Remote shell failed to open");
                let reason = e.to_string();
                let _ = tx
                    .send(Frame::Text(format!(
                        "\r\n*** Could not connect to {}: {reason} ***\r\n",
                        target.label()
                    )))
                    .await;
                let _ = tx.send(Frame::close(reason.as_str())).await;
                self.release(handle, SessionOutcome::Error).await;
                return BridgeExit::ConnectFailed(reason);
            }
        };

        tracing::info!(%handle, target_id = %target.id, "Bridge ready");

        // The two directions run independently. Dropping the input sender
        // closes the remote side.
        let ShellChannel { events, input } = shell;
        let exit = tokio::select! {
            exit = forward_output(events, tx.as_mut()) => exit,
            exit = forward_input(rx.as_mut(), input, handle) => exit,
        };

        let _ = tx.close().await;

        if let Some(outcome) = exit.outcome() {
            self.release(handle, outcome).await;
        }
        tracing::info!(%handle, exit = ?exit, "Bridge closed");
        exit
    }

    async fn release(&self, handle: SessionHandle, outcome: SessionOutcome) {
        if let Err(e) = self.manager.release(handle, outcome).await {
            tracing::error!(%handle, error = %e, "Failed to release session");
        }
    }
}

/// Remote events to caller frames, until either side ends.
async fn forward_output<Tx>(
    mut events: mpsc::Receiver<ShellEvent>,
    mut tx: Pin<&mut Tx>,
) -> BridgeExit
where
    Tx: Sink<Frame>,
{
    loop {
        match events.recv().await {
            Some(ShellEvent::Data(chunk)) => {
                if tx.send(Frame::Binary(chunk)).await.is_err() {
                    return BridgeExit::CallerClosed;
                }
            }
            Some(ShellEvent::Error(reason)) => {
                let _ = tx.send(Frame::close(reason.as_str())).await;
                return BridgeExit::RemoteError(reason);
            }
            Some(ShellEvent::Closed) | None => {
                let _ = tx.send(Frame::Close(None)).await;
                return BridgeExit::RemoteClosed;
            }
        }
    }
}

/// Caller frames to remote input, until the caller closes.
async fn forward_input<Rx>(
    mut rx: Pin<&mut Rx>,
    input: mpsc::Sender<ShellInput>,
    handle: SessionHandle,
) -> BridgeExit
where
    Rx: Stream<Item = Frame>,
{
    while let Some(frame) = rx.next().await {
        let message = match frame {
            Frame::Text(text) => match ControlMessage::parse(&text) {
                Some(ControlMessage::Resize { cols, rows }) => ShellInput::Resize { cols, rows },
                None => ShellInput::Data(Bytes::from(text)),
            },
            Frame::Binary(data) => ShellInput::Data(data),
            Frame::Close(_) => break,
        };
        if input.send(message).await.is_err() {
            tracing::debug!(%handle, "Remote input closed");
        }
    }
    BridgeExit::CallerClosed
}
