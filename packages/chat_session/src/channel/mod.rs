//! The realtime channel collaborator.
//!
//! A [`Connector`] opens one [`Channel`] per username. The channel is split
//! into a [`ChannelHandle`] (outbound text, close) and [`ChannelEvents`] (an
//! inbound sequence of messages ending in exactly one `Closed`).
//!
//! Contract for implementations: every outbound text the server accepts is
//! rebroadcast to all connected channels, the sender's own included. The
//! session never echoes its own messages locally.

pub mod ws;

use std::future::Future;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{CloseReason, SessionError};
use crate::models::Message;

pub trait Connector: Send + Sync + 'static {
    fn open(&self, username: &str) -> impl Future<Output = Result<Channel, SessionError>> + Send;
}

/// Commands from a [`ChannelHandle`] to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Events delivered by an open channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Message(Message),
    Closed(CloseReason),
}

/// Decode one inbound text frame into a message.
pub fn decode_frame(text: &str) -> Result<Message, serde_json::Error> {
    serde_json::from_str(text)
}

/// Sending half of a channel. Dropping it closes the channel too.
#[derive(Debug)]
pub struct ChannelHandle {
    username: String,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ChannelHandle {
    pub fn new(username: impl Into<String>, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            username: username.into(),
            outbound,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Queue one text frame. Fails once the transport has gone away.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.outbound
            .send(Outbound::Text(text.into()))
            .map_err(|_| SessionError::ChannelClosed(CloseReason::Dropped))
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Close the channel. Consumes the handle, so a channel is closed once.
    pub fn close(self) {
        debug!("Closing channel for {}", self.username);
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Receiving half of a channel.
///
/// Yields inbound messages in transport order, then one `Closed`, then
/// `None` forever. The sequence cannot be restarted.
#[derive(Debug)]
pub struct ChannelEvents {
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    finished: bool,
}

impl ChannelEvents {
    pub fn new(inbound: mpsc::UnboundedReceiver<ChannelEvent>) -> Self {
        Self {
            inbound,
            finished: false,
        }
    }

    pub async fn next(&mut self) -> Option<ChannelEvent> {
        if self.finished {
            return None;
        }
        match self.inbound.recv().await {
            Some(ChannelEvent::Closed(reason)) => {
                self.finished = true;
                self.inbound.close();
                Some(ChannelEvent::Closed(reason))
            }
            Some(event) => Some(event),
            None => {
                self.finished = true;
                Some(ChannelEvent::Closed(CloseReason::Dropped))
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// The transport's view of a channel: what the handle sent, and where to
/// push inbound events.
#[derive(Debug)]
pub struct TransportEnd {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub inbound: mpsc::UnboundedSender<ChannelEvent>,
}

/// An open channel, as returned by a [`Connector`].
#[derive(Debug)]
pub struct Channel {
    pub handle: ChannelHandle,
    pub events: ChannelEvents,
}

impl Channel {
    /// Build a channel and the transport end that services it.
    pub fn new(username: impl Into<String>) -> (Self, TransportEnd) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let channel = Self {
            handle: ChannelHandle::new(username, out_tx),
            events: ChannelEvents::new(in_rx),
        };
        let transport = TransportEnd {
            outbound: out_rx,
            inbound: in_tx,
        };
        (channel, transport)
    }

    pub fn into_parts(self) -> (ChannelHandle, ChannelEvents) {
        (self.handle, self.events)
    }
}
