//! Moves bytes between a russh channel and a [`RemoteEnd`].

use bytes::Bytes;
use russh::{Channel, ChannelMsg, client};
use shellgate_core::{RemoteEnd, ShellEvent, ShellInput};
use tokio::task::JoinHandle;

/// What the pump does with one message read from the channel.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Forward(ShellEvent),
    Finish(ShellEvent),
    Ignore,
}

/// Maps channel messages to shell events.
///
/// A channel that disappears without an `Eof`, exit report or `Close`
/// was lost (transport reset, keepalive timeout) and ends with an error.
#[derive(Debug, Default)]
struct ChannelTracker {
    orderly: bool,
}

impl ChannelTracker {
    fn step(&mut self, msg: Option<ChannelMsg>) -> Step {
        match msg {
            Some(ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, ext: 1 }) => {
                Step::Forward(ShellEvent::Data(Bytes::copy_from_slice(&data)))
            }
            Some(
                ChannelMsg::Eof | ChannelMsg::ExitStatus { .. } | ChannelMsg::ExitSignal { .. },
            ) => {
                self.orderly = true;
                Step::Ignore
            }
            Some(ChannelMsg::Close) => Step::Finish(ShellEvent::Closed),
            Some(_) => Step::Ignore,
            None if self.orderly => Step::Finish(ShellEvent::Closed),
            None => Step::Finish(ShellEvent::Error("connection lost".to_string())),
        }
    }
}

/// Run the channel until either side closes.
///
/// Owns the client handle so the connection lives exactly as long as the
/// pump. Output and input run as independent halves, so a full queue in
/// one direction never stalls the other. Dropping the caller's input
/// sender closes the channel.
pub(crate) fn spawn<H>(
    handle: client::Handle<H>,
    channel: Channel<client::Msg>,
    remote: RemoteEnd,
    label: String,
) -> JoinHandle<()>
where
    H: client::Handler + 'static,
{
    tokio::spawn(async move {
        let RemoteEnd {
            events,
            input: mut input_rx,
        } = remote;
        let (mut reader, writer) = channel.split();

        let output = async {
            let mut tracker = ChannelTracker::default();
            loop {
                let msg = reader.wait().await;
                if let Some(ChannelMsg::ExitStatus { exit_status }) = &msg {
                    tracing::debug!(remote = %label, exit_status, "Remote shell exited");
                }
                match tracker.step(msg) {
                    Step::Forward(event) => {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Step::Finish(event) => {
                        if let ShellEvent::Error(reason) = &event {
                            tracing::warn!(remote = %label, %reason, "Remote channel lost");
                        }
                        let _ = events.send(event).await;
                        break;
                    }
                    Step::Ignore => {}
                }
            }
        };

        let input = async {
            while let Some(input) = input_rx.recv().await {
                match input {
                    ShellInput::Data(bytes) => {
                        if let Err(e) = writer.data(&bytes[..]).await {
                            tracing::warn!(remote = %label, error = %e, "Write to remote shell failed");
                            let _ = events.send(ShellEvent::Error(e.to_string())).await;
                            return;
                        }
                    }
                    ShellInput::Resize { cols, rows } => {
                        if let Err(e) = writer.window_change(cols.into(), rows.into(), 0, 0).await {
                            tracing::debug!(remote = %label, error = %e, "Window change failed");
                        }
                    }
                }
            }
            tracing::debug!(remote = %label, "Caller released shell");
        };

        tokio::select! {
            () = output => {}
            () = input => {}
        }

        let _ = writer.close().await;
        if let Err(e) = handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!(remote = %label, error = %e, "Disconnect failed");
        }
        tracing::debug!(remote = %label, "Shell pump stopped");
    })
}
