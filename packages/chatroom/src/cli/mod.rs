pub mod input;

use anyhow::{Context, Result};
use chat_session::{
    Connector, HistorySource, HttpHistory, Identity, Message, SessionManager, SessionUpdate,
    SubmitOutcome, WsConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::config::{ClientConfig, FileConfig};
use input::{HELP, InputCommand, parse_line};

/// `chat join`: open a session for the identity and chat until stdin closes
/// or the user quits.
pub async fn join_command(config: &FileConfig, username: String, token: String) -> Result<()> {
    let client = ClientConfig::from_file(config);
    debug!("Client config: {:?}", client);

    let history = HttpHistory::new(&client.history_url)
        .context("Failed to build HTTP client")?
        .with_page(client.history_skip, client.history_limit)
        .with_timeout(client.history_timeout);
    let connector =
        WsConnector::new(&client.channel_base).with_connect_timeout(client.connect_timeout);

    let mut session = SessionManager::new(history, connector);
    session.login(Identity::new(username, token));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if handle_line(&mut session, &line) == Flow::Quit {
                    break;
                }
            }
            update = session.step() => render_update(&session, &update),
        }
    }

    session.logout();
    info!("Left the room");
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn handle_line<H, C>(session: &mut SessionManager<H, C>, line: &str) -> Flow
where
    H: HistorySource,
    C: Connector,
{
    match parse_line(line) {
        InputCommand::Say(mut text) => match session.submit(&mut text) {
            SubmitOutcome::Sent | SubmitOutcome::Empty => {}
            SubmitOutcome::NotConnected => notice("not connected, message not sent"),
        },
        InputCommand::Login { username, token } => {
            notice(&format!("joining as {}", username));
            session.login(Identity::new(username, token));
        }
        InputCommand::Logout => {
            session.logout();
            notice("logged out (use /login USER to rejoin)");
        }
        InputCommand::Retry => {
            if !session.retry_history() {
                notice("nothing to retry");
            }
        }
        InputCommand::Quit => return Flow::Quit,
        InputCommand::Help => eprintln!("{}", HELP),
        InputCommand::Invalid(msg) => notice(&msg),
    }
    Flow::Continue
}

fn render_update<H, C>(session: &SessionManager<H, C>, update: &SessionUpdate)
where
    H: HistorySource,
    C: Connector,
{
    match update {
        SessionUpdate::HistoryLoaded { .. } => {
            for line in history_lines(session.messages()) {
                println!("{}", line);
            }
        }
        SessionUpdate::Message(message) => println!("{}", message),
        other => {
            if let Some(text) = status_text(other) {
                notice(&text);
            }
        }
    }
}

fn history_lines(messages: &[Message]) -> Vec<String> {
    let mut lines = Vec::with_capacity(messages.len() + 1);
    lines.push(format!("--- {} earlier messages ---", messages.len()));
    lines.extend(messages.iter().map(|m| m.to_string()));
    lines
}

/// Text for the updates that are shown as status notices on stderr.
fn status_text(update: &SessionUpdate) -> Option<String> {
    match update {
        SessionUpdate::HistoryFailed(e) => Some(format!("{} (use /retry)", e)),
        SessionUpdate::Connected => Some("connected".to_string()),
        SessionUpdate::ChannelClosed(reason) => Some(format!("disconnected: {}", reason)),
        SessionUpdate::HistoryLoaded { .. } | SessionUpdate::Message(_) => None,
    }
}

fn notice(text: &str) {
    eprintln!("[chat: {}]", text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_session::{CloseReason, SessionError};

    #[test]
    fn history_lines_have_header_then_messages() {
        let lines = history_lines(&[Message::new("alice", "hi"), Message::new("bob", "yo")]);
        assert_eq!(
            lines,
            ["--- 2 earlier messages ---", "alice: hi", "bob: yo"]
        );
    }

    #[test]
    fn empty_history_still_has_header() {
        assert_eq!(history_lines(&[]), ["--- 0 earlier messages ---"]);
    }

    #[test]
    fn status_texts() {
        assert_eq!(
            status_text(&SessionUpdate::Connected).as_deref(),
            Some("connected")
        );
        let failed = SessionUpdate::HistoryFailed(SessionError::HistoryLoadFailure(
            "server is unavailable".into(),
        ));
        assert_eq!(
            status_text(&failed).as_deref(),
            Some("failed to load message history: server is unavailable (use /retry)")
        );
        let closed = SessionUpdate::ChannelClosed(CloseReason::Dropped);
        assert_eq!(
            status_text(&closed).as_deref(),
            Some("disconnected: connection dropped")
        );
        assert!(status_text(&SessionUpdate::Message(Message::new("a", "b"))).is_none());
    }
}
