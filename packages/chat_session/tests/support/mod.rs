//! A minimal chat backend for integration tests: a JSON history endpoint and
//! a websocket per user that stores and rebroadcasts every text frame.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message as WsFrame, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chat_session::Message;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;

/// Username the server disconnects right after the handshake.
pub const KICKED_USER: &str = "kicked";
pub const KICK_CODE: u16 = 4000;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct ServerState {
    store: Arc<Mutex<Vec<Message>>>,
    broadcast: broadcast::Sender<String>,
    connected: Arc<AtomicUsize>,
    journal: Arc<Mutex<Vec<String>>>,
    fail_history: Arc<AtomicBool>,
}

pub struct TestServer {
    addr: SocketAddr,
    state: ServerState,
}

impl TestServer {
    pub async fn start(history: Vec<Message>) -> Self {
        let (broadcast, _) = broadcast::channel(256);
        let state = ServerState {
            store: Arc::new(Mutex::new(history)),
            broadcast,
            connected: Arc::new(AtomicUsize::new(0)),
            journal: Arc::new(Mutex::new(Vec::new())),
            fail_history: Arc::new(AtomicBool::new(false)),
        };

        let app = Router::new()
            .route("/messages/", get(list_messages))
            .route("/ws/{username}", get(websocket_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });

        Self { addr, state }
    }

    pub fn history_url(&self) -> String {
        format!("http://{}/messages/", self.addr)
    }

    pub fn channel_base(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn set_history_failing(&self, failing: bool) {
        self.state.fail_history.store(failing, Ordering::SeqCst);
    }

    /// Push a raw text frame to every connected socket.
    pub fn broadcast_raw(&self, frame: &str) {
        let _ = self.state.broadcast.send(frame.to_string());
    }

    /// Push a message from a user that is not connected through a session.
    pub fn broadcast_message(&self, message: &Message) {
        self.broadcast_raw(&serde_json::to_string(message).expect("encode"));
    }

    pub fn stored(&self) -> Vec<Message> {
        self.state.store.lock().unwrap().clone()
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.journal.lock().unwrap().clone()
    }

    /// Wait until exactly `n` sockets are subscribed to the broadcast.
    pub async fn wait_for_clients(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
        while self.state.connected.load(Ordering::SeqCst) != n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} connected clients (have {})",
                n,
                self.state.connected.load(Ordering::SeqCst)
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[derive(Deserialize)]
struct Page {
    skip: Option<usize>,
    limit: Option<usize>,
}

async fn list_messages(State(state): State<ServerState>, Query(page): Query<Page>) -> Response {
    if state.fail_history.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let skip = page.skip.unwrap_or(0);
    let limit = page.limit.unwrap_or(100);
    let messages: Vec<Message> = state
        .store
        .lock()
        .unwrap()
        .iter()
        .skip(skip)
        .take(limit)
        .cloned()
        .collect();
    Json(messages).into_response()
}

async fn websocket_handler(
    State(state): State<ServerState>,
    Path(username): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state, username))
}

async fn handle_websocket(socket: WebSocket, state: ServerState, username: String) {
    let (mut sender, mut receiver) = socket.split();

    if username == KICKED_USER {
        let frame = CloseFrame {
            code: KICK_CODE,
            reason: Utf8Bytes::from_static("kicked"),
        };
        let _ = sender.send(WsFrame::Close(Some(frame))).await;
        return;
    }

    let mut updates = state.broadcast.subscribe();
    state.journal.lock().unwrap().push(format!("+{}", username));
    state.connected.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(json) => {
                    if sender.send(WsFrame::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            frame = receiver.next() => match frame {
                Some(Ok(WsFrame::Text(text))) => {
                    let message = Message::new(username.clone(), text.as_str());
                    state.store.lock().unwrap().push(message.clone());
                    let json = serde_json::to_string(&message).expect("encode");
                    let _ = state.broadcast.send(json);
                }
                Some(Ok(WsFrame::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.journal.lock().unwrap().push(format!("-{}", username));
    state.connected.fetch_sub(1, Ordering::SeqCst);
}
