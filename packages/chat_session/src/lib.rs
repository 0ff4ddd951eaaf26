//! Chat Session - connection lifecycle for a realtime chat client
//!
//! This crate owns everything between "we know who the user is" and "the user
//! logged out": a one-shot history load, a single websocket channel scoped to
//! the username, the ordered message log, and teardown. It has no rendering
//! and no credential handling; callers hand it an [`Identity`] and drive it.
//!
//! # Example
//!
//! ```no_run
//! use chat_session::{HttpHistory, Identity, SessionManager, SessionUpdate, WsConnector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let history = HttpHistory::new("http://localhost:8000/messages/").unwrap();
//!     let connector = WsConnector::new("ws://localhost:8000/ws");
//!     let mut session = SessionManager::new(history, connector);
//!
//!     session.login(Identity::new("alice", "token"));
//!
//!     loop {
//!         match session.step().await {
//!             SessionUpdate::Connected => {
//!                 let mut input = String::from("hello");
//!                 session.submit(&mut input);
//!             }
//!             SessionUpdate::Message(msg) => println!("{}: {}", msg.username, msg.text),
//!             SessionUpdate::ChannelClosed(_) => break,
//!             _ => {}
//!         }
//!     }
//!
//!     session.logout();
//! }
//! ```

pub mod channel;
mod error;
pub mod history;
mod log;
mod models;
mod session;

#[cfg(test)]
mod test_support;

pub use channel::ws::WsConnector;
pub use channel::{Channel, ChannelEvent, ChannelEvents, ChannelHandle, Connector, Outbound};
pub use error::{CloseReason, SessionError};
pub use history::{HistorySource, HttpHistory};
pub use log::MessageLog;
pub use models::{Identity, Message};
pub use session::{SessionEvent, SessionManager, SessionState, SessionUpdate, SubmitOutcome};
