//! The session: one identity, one history load, one channel, one log.
//!
//! All mutation happens through `&mut SessionManager` on the caller's task.
//! Background work (history fetch, channel open, inbound pump) runs in
//! spawned tasks that only ever report back through the manager's event
//! queue, tagged with the epoch of the session that spawned them. Events
//! from an ended session are discarded by [`SessionManager::apply`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelEvent, ChannelEvents, ChannelHandle, Connector};
use crate::error::{CloseReason, SessionError};
use crate::history::HistorySource;
use crate::log::MessageLog;
use crate::models::{Identity, Message};

/// Where the current session is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    NoIdentity,
    LoadingHistory,
    /// The history request failed; [`SessionManager::retry_history`] re-issues it.
    HistoryFailed { error: SessionError },
    Connecting,
    Live,
    /// The channel is gone. No more inbound messages until a new login.
    Degraded { reason: CloseReason },
}

impl SessionState {
    /// Loading, connecting or live: the session is still making progress.
    pub fn is_healthy(&self) -> bool {
        matches!(
            self,
            SessionState::LoadingHistory | SessionState::Connecting | SessionState::Live
        )
    }
}

/// What an applied event changed, for the view layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    HistoryLoaded { count: usize },
    HistoryFailed(SessionError),
    Connected,
    Message(Message),
    ChannelClosed(CloseReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// One frame was queued and the input was cleared.
    Sent,
    /// The input was empty or whitespace only.
    Empty,
    /// No channel is open.
    NotConnected,
}

/// A background result waiting to be applied.
#[derive(Debug)]
pub struct SessionEvent {
    epoch: u64,
    kind: EventKind,
}

#[derive(Debug)]
enum EventKind {
    History(Result<Vec<Message>, SessionError>),
    Opened(Result<Channel, SessionError>),
    Channel(ChannelEvent),
}

struct Session {
    epoch: u64,
    identity: Identity,
    state: SessionState,
    log: MessageLog,
    channel: Option<ChannelHandle>,
    tasks: Vec<AbortHandle>,
}

impl Session {
    fn new(epoch: u64, identity: Identity) -> Self {
        Self {
            epoch,
            identity,
            state: SessionState::LoadingHistory,
            log: MessageLog::new(),
            channel: None,
            tasks: Vec::new(),
        }
    }

    /// Stop background work and close the channel, if one is open.
    fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }
}

/// Owns the session for whichever identity is current.
///
/// Must be used inside a tokio runtime: starting a session spawns tasks.
///
/// A channel whose open completes after its session ended is only closed
/// when its event is applied, so callers should keep driving
/// [`step`](Self::step) (or [`next_event`](Self::next_event) and
/// [`apply`](Self::apply)) for as long as the manager is alive.
pub struct SessionManager<H, C> {
    history: Arc<H>,
    connector: Arc<C>,
    session: Option<Session>,
    next_epoch: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<H: HistorySource, C: Connector> SessionManager<H, C> {
    pub fn new(history: H, connector: C) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            history: Arc::new(history),
            connector: Arc::new(connector),
            session: None,
            next_epoch: 0,
            events_tx,
            events_rx,
        }
    }

    /// Reconcile with the externally held identity.
    ///
    /// The same username keeps a session that is loading, connecting or live
    /// (only the stored identity is refreshed). A failed or degraded session
    /// is replaced, so logging in again recovers it. Any other change closes
    /// the current channel first, then starts over with an empty log.
    pub fn set_identity(&mut self, identity: Option<Identity>) {
        if let (Some(current), Some(next)) = (self.session.as_mut(), identity.as_ref()) {
            if current.identity.username == next.username && current.state.is_healthy() {
                current.identity = next.clone();
                return;
            }
        }

        self.teardown();

        if let Some(identity) = identity {
            self.start(identity);
        }
    }

    pub fn login(&mut self, identity: Identity) {
        self.set_identity(Some(identity));
    }

    pub fn logout(&mut self) {
        self.set_identity(None);
    }

    /// Re-issue the history request after a failure. Returns false if the
    /// session is not in [`SessionState::HistoryFailed`].
    pub fn retry_history(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !matches!(session.state, SessionState::HistoryFailed { .. }) {
            return false;
        }
        info!("Retrying history load for {}", session.identity.username);
        session.state = SessionState::LoadingHistory;
        session
            .tasks
            .push(spawn_history(&self.history, &self.events_tx, session.epoch));
        true
    }

    /// Send the trimmed input over the open channel and clear it.
    ///
    /// The message is not added to the log here; it arrives back through the
    /// channel like every other message.
    pub fn submit(&self, input: &mut String) -> SubmitOutcome {
        let text = input.trim();
        if text.is_empty() {
            return SubmitOutcome::Empty;
        }
        let Some(channel) = self.session.as_ref().and_then(|s| s.channel.as_ref()) else {
            return SubmitOutcome::NotConnected;
        };
        match channel.send(text.to_string()) {
            Ok(()) => {
                input.clear();
                SubmitOutcome::Sent
            }
            Err(e) => {
                warn!("Dropping outbound message for {}: {}", channel.username(), e);
                SubmitOutcome::NotConnected
            }
        }
    }

    /// Wait for the next background result. Cancel safe.
    pub async fn next_event(&mut self) -> SessionEvent {
        // The manager holds a sender, so the queue never reports closed.
        match self.events_rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    /// Apply one background result. Returns `None` for events that belong
    /// to a session that has since ended.
    pub fn apply(&mut self, event: SessionEvent) -> Option<SessionUpdate> {
        let SessionEvent { epoch, kind } = event;

        let Some(session) = self.session.as_mut().filter(|s| s.epoch == epoch) else {
            match kind {
                EventKind::Opened(Ok(channel)) => {
                    debug!(
                        "Closing channel for {} opened after its session ended",
                        channel.handle.username()
                    );
                    channel.handle.close();
                }
                _ => debug!("Discarding event from ended session {}", epoch),
            }
            return None;
        };

        match kind {
            EventKind::History(Ok(messages)) => {
                let count = messages.len();
                session.log.replace(messages);
                session.state = SessionState::Connecting;
                session.tasks.push(spawn_connect(
                    &self.connector,
                    &self.events_tx,
                    epoch,
                    session.identity.username.clone(),
                ));
                Some(SessionUpdate::HistoryLoaded { count })
            }
            EventKind::History(Err(error)) => {
                warn!(
                    "History load failed for {}: {}",
                    session.identity.username, error
                );
                session.state = SessionState::HistoryFailed {
                    error: error.clone(),
                };
                Some(SessionUpdate::HistoryFailed(error))
            }
            EventKind::Opened(Ok(channel)) => {
                let (handle, events) = channel.into_parts();
                info!("Channel open for {}", session.identity.username);
                session.channel = Some(handle);
                session
                    .tasks
                    .push(spawn_pump(&self.events_tx, epoch, events));
                session.state = SessionState::Live;
                Some(SessionUpdate::Connected)
            }
            EventKind::Opened(Err(error)) => {
                let reason = match error {
                    SessionError::ChannelClosed(reason) => reason,
                    other => CloseReason::Failed(other.to_string()),
                };
                warn!(
                    "Could not open channel for {}: {}",
                    session.identity.username, reason
                );
                session.state = SessionState::Degraded {
                    reason: reason.clone(),
                };
                Some(SessionUpdate::ChannelClosed(reason))
            }
            EventKind::Channel(ChannelEvent::Message(message)) => {
                if session.state != SessionState::Live {
                    return None;
                }
                session.log.append(message.clone());
                Some(SessionUpdate::Message(message))
            }
            EventKind::Channel(ChannelEvent::Closed(reason)) => {
                warn!(
                    "Channel for {} closed: {}",
                    session.identity.username, reason
                );
                session.channel = None;
                session.state = SessionState::Degraded {
                    reason: reason.clone(),
                };
                Some(SessionUpdate::ChannelClosed(reason))
            }
        }
    }

    /// Wait for and apply events until one changes the current session.
    pub async fn step(&mut self) -> SessionUpdate {
        loop {
            let event = self.next_event().await;
            if let Some(update) = self.apply(event) {
                return update;
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::NoIdentity, |s| s.state.clone())
    }

    pub fn messages(&self) -> &[Message] {
        self.session
            .as_ref()
            .map(|s| s.log.as_slice())
            .unwrap_or_default()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    fn start(&mut self, identity: Identity) {
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        info!("Starting session {} for {}", epoch, identity.username);

        let mut session = Session::new(epoch, identity);
        session
            .tasks
            .push(spawn_history(&self.history, &self.events_tx, epoch));
        self.session = Some(session);
    }

    /// End the current session: stop its background work, close its channel
    /// and drop its log. Synchronous; nothing from this session is applied
    /// afterwards.
    fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.close();
        info!(
            "Session {} for {} ended ({} messages discarded)",
            session.epoch,
            session.identity.username,
            session.log.len()
        );
    }
}

impl<H, C> Drop for SessionManager<H, C> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}

fn spawn_history<H: HistorySource>(
    history: &Arc<H>,
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
    epoch: u64,
) -> AbortHandle {
    let history = history.clone();
    let events_tx = events_tx.clone();
    tokio::spawn(async move {
        let result = history.fetch().await;
        let _ = events_tx.send(SessionEvent {
            epoch,
            kind: EventKind::History(result),
        });
    })
    .abort_handle()
}

fn spawn_connect<C: Connector>(
    connector: &Arc<C>,
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
    epoch: u64,
    username: String,
) -> AbortHandle {
    let connector = connector.clone();
    let events_tx = events_tx.clone();
    tokio::spawn(async move {
        let result = connector.open(&username).await;
        let _ = events_tx.send(SessionEvent {
            epoch,
            kind: EventKind::Opened(result),
        });
    })
    .abort_handle()
}

/// Forward a channel's inbound sequence into the event queue until it ends.
fn spawn_pump(
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
    epoch: u64,
    mut events: ChannelEvents,
) -> AbortHandle {
    let events_tx = events_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let event = SessionEvent {
                epoch,
                kind: EventKind::Channel(event),
            };
            if events_tx.send(event).is_err() {
                break;
            }
        }
    })
    .abort_handle()
}
