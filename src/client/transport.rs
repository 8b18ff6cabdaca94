use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::machine::{SocketId, CLOSE_ABNORMAL};

/// Close frame received without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

/// Frames the driver asks a socket task to write.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Text(String),
    Close(u16),
}

/// What a socket task reports back, tagged with the socket it belongs to.
#[derive(Debug)]
pub enum SocketEvent {
    Opened(SocketId, mpsc::UnboundedSender<Outgoing>),
    Message(SocketId, String),
    Error(SocketId, String),
    Closed(SocketId, u16),
}

/// Open a WebSocket to `url` and pump it until it closes.
///
/// Every socket ends with exactly one [`SocketEvent::Closed`], including a
/// failed handshake, which reports an error followed by a 1006 close.
pub fn spawn_socket(
    socket: SocketId,
    url: String,
    events: mpsc::UnboundedSender<SocketEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!("Realtime connection failed: {}", e);
                let _ = events.send(SocketEvent::Error(socket, e.to_string()));
                let _ = events.send(SocketEvent::Closed(socket, CLOSE_ABNORMAL));
                return;
            }
        };

        let (outgoing_tx, mut outgoing) = mpsc::unbounded_channel();
        if events.send(SocketEvent::Opened(socket, outgoing_tx)).is_err() {
            return;
        }

        let (mut sink, mut source) = stream.split();
        let code = loop {
            tokio::select! {
                frame = outgoing.recv() => match frame {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            let _ = events.send(SocketEvent::Error(socket, e.to_string()));
                            break CLOSE_ABNORMAL;
                        }
                    }
                    Some(Outgoing::Close(code)) => {
                        let frame = CloseFrame { code: CloseCode::from(code), reason: "".into() };
                        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                            debug!("Failed to send close frame: {}", e);
                        }
                        break code;
                    }
                    // Driver went away
                    None => {
                        let _ = sink.close().await;
                        break CLOSE_ABNORMAL;
                    }
                },
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send(SocketEvent::Message(socket, text.to_string()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map_or(CLOSE_NO_STATUS, |f| u16::from(f.code));
                    }
                    // Pings are answered by tungstenite; binary is not part of the protocol
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = events.send(SocketEvent::Error(socket, e.to_string()));
                        break CLOSE_ABNORMAL;
                    }
                    None => break CLOSE_ABNORMAL,
                },
            }
        };

        debug!("Socket {} closed with code {}", socket, code);
        let _ = events.send(SocketEvent::Closed(socket, code));
    })
}
