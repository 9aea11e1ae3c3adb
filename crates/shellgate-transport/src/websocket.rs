//! WebSocket transport for web terminals.

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt, future};
use shellgate_core::{
    RemoteConnector, SessionHandle,
    traits::{AuditStore, TargetStore},
};

use crate::{
    bridge::{Bridge, BridgeExit},
    protocol::Frame,
};

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::Text(text.into()),
            Frame::Binary(data) => Self::Binary(data),
            Frame::Close(reason) => Self::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: reason.unwrap_or_default().into(),
            })),
        }
    }
}

/// Map an incoming WebSocket message to a frame. Ping and pong are
/// handled by axum and yield `None`.
#[must_use]
pub fn message_to_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        Message::Binary(data) => Some(Frame::Binary(data)),
        Message::Close(frame) => Some(Frame::Close(
            frame
                .map(|f| f.reason.as_str().to_owned())
                .filter(|reason| !reason.is_empty()),
        )),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}

/// Attach an upgraded socket to a session.
pub async fn serve_socket<S, C>(
    socket: WebSocket,
    bridge: Bridge<S, C>,
    handle: SessionHandle,
) -> BridgeExit
where
    S: TargetStore + AuditStore + ?Sized,
    C: RemoteConnector + ?Sized,
{
    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));
    // A transport error ends the stream, which the bridge treats as a close.
    let stream = stream
        .take_while(|message| {
            if let Err(e) = message {
                tracing::debug!(error = %e, "WebSocket receive failed");
            }
            future::ready(message.is_ok())
        })
        .filter_map(|message| future::ready(message.ok().and_then(message_to_frame)));

    bridge.attach(handle, sink, stream).await
}

/// WebSocket upgrade handler for `/ws/{handle}`.
pub async fn ws_handler<S, C>(
    ws: WebSocketUpgrade,
    Path(handle): Path<SessionHandle>,
    State(bridge): State<Bridge<S, C>>,
) -> impl IntoResponse
where
    S: TargetStore + AuditStore + ?Sized + 'static,
    C: RemoteConnector + ?Sized + 'static,
{
    tracing::debug!(%handle, "WebSocket attach requested");
    ws.on_upgrade(move |socket| async move {
        serve_socket(socket, bridge, handle).await;
    })
}

/// Create the WebSocket router.
///
/// # Example
/// ```ignore
/// let app = Router::new().merge(create_ws_router(bridge));
/// ```
#[must_use]
pub fn create_ws_router<S, C>(bridge: Bridge<S, C>) -> axum::Router
where
    S: TargetStore + AuditStore + ?Sized + 'static,
    C: RemoteConnector + ?Sized + 'static,
{
    axum::Router::new()
        .route("/ws/{handle}", get(ws_handler::<S, C>))
        .with_state(bridge)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_frames_map_to_messages() {
        assert!(matches!(Message::from(Frame::Text("hi".into())), Message::Text(t) if t.as_str() == "hi"));
        assert!(matches!(
            Message::from(Frame::Binary(Bytes::from_static(b"\x00\x01"))),
            Message::Binary(b) if b.as_ref() == b"\x00\x01"
        ));
        let Message::Close(Some(close)) = Message::from(Frame::Close(Some("bye".into()))) else {
            panic!("expected close frame");
        };
        assert_eq!(close.code, close_code::NORMAL);
        assert_eq!(close.reason.as_str(), "bye");
    }

    #[test]
    fn test_messages_map_to_frames() {
        assert_eq!(
            message_to_frame(Message::Text("ls\r".into())),
            Some(Frame::Text("ls\r".into()))
        );
        assert_eq!(
            message_to_frame(Message::Binary(Bytes::from_static(b"\x03"))),
            Some(Frame::Binary(Bytes::from_static(b"\x03")))
        );
        assert_eq!(message_to_frame(Message::Ping(Bytes::new())), None);
        assert_eq!(message_to_frame(Message::Close(None)), Some(Frame::Close(None)));
    }
}
