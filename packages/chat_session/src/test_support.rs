//! In-memory stand-ins for the history store and the channel transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelEvent, Connector, Outbound};
use crate::error::SessionError;
use crate::history::HistorySource;
use crate::models::Message;

#[derive(Default)]
struct FakeHistoryState {
    responses: VecDeque<Result<Vec<Message>, SessionError>>,
    calls: usize,
}

/// Answers fetches from a queue. Once the queue is empty, fetches never
/// complete.
#[derive(Clone, Default)]
pub struct FakeHistory {
    state: Arc<Mutex<FakeHistoryState>>,
}

impl FakeHistory {
    pub fn with(responses: Vec<Result<Vec<Message>, SessionError>>) -> Self {
        let history = Self::default();
        history.state.lock().unwrap().responses = responses.into();
        history
    }

    pub fn ok(messages: Vec<Message>) -> Self {
        Self::with(vec![Ok(messages)])
    }

    pub fn pending() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }
}

impl HistorySource for FakeHistory {
    async fn fetch(&self) -> Result<Vec<Message>, SessionError> {
        let next = {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            state.responses.pop_front()
        };
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

struct FakeLink {
    username: String,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<ChannelEvent>,
    sent: Vec<String>,
    closes: usize,
}

#[derive(Default)]
struct FakeConnectorState {
    links: Vec<FakeLink>,
    journal: Vec<String>,
    fail_next: Option<SessionError>,
    echo: bool,
}

impl FakeConnectorState {
    /// Move queued handle commands into each link's record.
    fn drain(&mut self) {
        let echo = self.echo;
        for link in &mut self.links {
            while let Ok(command) = link.outbound.try_recv() {
                match command {
                    Outbound::Text(text) => {
                        if echo {
                            let _ = link.inbound.send(ChannelEvent::Message(Message::new(
                                link.username.clone(),
                                text.clone(),
                            )));
                        }
                        link.sent.push(text);
                    }
                    Outbound::Close => {
                        link.closes += 1;
                        self.journal.push(format!("close {}", link.username));
                    }
                }
            }
        }
    }
}

/// Records every channel it opens. Links are indexed in open order.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<FakeConnectorState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebroadcast every sent text back to its own channel, the way the
    /// chat server does.
    pub fn echoing(self) -> Self {
        self.state.lock().unwrap().echo = true;
        self
    }

    pub fn fail_next_open(&self, error: SessionError) {
        self.state.lock().unwrap().fail_next = Some(error);
    }

    pub fn inject(&self, link: usize, event: ChannelEvent) {
        let mut state = self.state.lock().unwrap();
        state.drain();
        let _ = state.links[link].inbound.send(event);
    }

    pub fn sent(&self, link: usize) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        state.drain();
        state.links[link].sent.clone()
    }

    pub fn closes(&self, link: usize) -> usize {
        let mut state = self.state.lock().unwrap();
        state.drain();
        state.links[link].closes
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }

    pub fn journal(&self) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        state.drain();
        state.journal.clone()
    }
}

impl Connector for FakeConnector {
    async fn open(&self, username: &str) -> Result<Channel, SessionError> {
        let mut state = self.state.lock().unwrap();
        state.drain();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }

        let (channel, transport) = Channel::new(username);
        state.journal.push(format!("open {}", username));
        state.links.push(FakeLink {
            username: username.to_string(),
            outbound: transport.outbound,
            inbound: transport.inbound,
            sent: Vec::new(),
            closes: 0,
        });
        Ok(channel)
    }
}
