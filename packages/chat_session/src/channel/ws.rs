use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::{Channel, ChannelEvent, Connector, Outbound, TransportEnd, decode_frame};
use crate::error::{CloseReason, SessionError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the server's close frame carries no status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens websocket channels at `<base_url>/<username>`.
#[derive(Clone, Debug)]
pub struct WsConnector {
    base_url: String,
    connect_timeout: Option<Duration>,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `<base_url>/<username>`, with the username percent-encoded as a
    /// single path segment.
    pub fn channel_url(&self, username: &str) -> Result<String, SessionError> {
        let invalid = |detail: String| {
            SessionError::ChannelClosed(CloseReason::Failed(format!(
                "invalid channel url {}: {}",
                self.base_url, detail
            )))
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot have a path".to_string()))?
            .pop_if_empty()
            .push(username);
        Ok(url.to_string())
    }
}

impl Connector for WsConnector {
    async fn open(&self, username: &str) -> Result<Channel, SessionError> {
        let url = self.channel_url(username)?;
        info!("Connecting channel {}", url);

        let connect = tokio_tungstenite::connect_async(url.as_str());
        let connected = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                SessionError::ChannelClosed(CloseReason::Failed(
                    "connection timed out".to_string(),
                ))
            })?,
            None => connect.await,
        };
        let (ws_stream, _response) = connected.map_err(SessionError::from_tungstenite)?;

        let (channel, transport) = Channel::new(username);
        tokio::spawn(run_socket(username.to_string(), ws_stream, transport));
        Ok(channel)
    }
}

/// Service one socket until either side closes it.
///
/// A local close (handle closed or dropped) ends silently; the session that
/// owned the handle is already gone. Anything else is reported as the
/// channel's single `Closed` event.
async fn run_socket(username: String, ws_stream: WsStream, transport: TransportEnd) {
    let TransportEnd {
        mut outbound,
        inbound,
    } = transport;
    let (mut ws_write, mut ws_read) = ws_stream.split();

    let remote_close = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    debug!("Sending {} bytes on channel {}", text.len(), username);
                    if let Err(e) = ws_write.send(tungstenite::Message::Text(text.into())).await {
                        break Some(CloseReason::Failed(e.to_string()));
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = ws_write.send(tungstenite::Message::Close(None)).await;
                    break None;
                }
            },
            frame = ws_read.next() => match frame {
                Some(Ok(tungstenite::Message::Text(text))) => match decode_frame(&text) {
                    Ok(message) => {
                        debug!("Received message from {} on channel {}", message.username, username);
                        if inbound.send(ChannelEvent::Message(message)).is_err() {
                            break None;
                        }
                    }
                    Err(e) => {
                        warn!("Dropping undecodable frame on channel {}: {}", username, e);
                    }
                },
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    let reason = match frame {
                        Some(frame) => CloseReason::Remote {
                            code: u16::from(frame.code),
                            reason: (*frame.reason).to_owned(),
                        },
                        None => CloseReason::Remote {
                            code: NO_STATUS_RECEIVED,
                            reason: String::new(),
                        },
                    };
                    break Some(reason);
                }
                Some(Ok(_)) => {
                    // Binary and control frames carry no chat data.
                }
                Some(Err(e)) => break Some(CloseReason::Failed(e.to_string())),
                None => break Some(CloseReason::Dropped),
            },
        }
    };

    match remote_close {
        Some(reason) => {
            warn!("Channel {} disconnected: {}", username, reason);
            let _ = inbound.send(ChannelEvent::Closed(reason));
        }
        None => info!("Channel {} closed", username),
    }
}
