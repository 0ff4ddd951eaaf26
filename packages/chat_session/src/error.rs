use tokio_tungstenite::tungstenite;

/// Why a realtime channel stopped delivering messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The server could not be reached at all.
    Unavailable,
    /// The server sent a close frame.
    Remote { code: u16, reason: String },
    /// The stream ended without a close frame.
    Dropped,
    /// Handshake or transport error.
    Failed(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Unavailable => write!(f, "server is unavailable"),
            CloseReason::Remote { code, reason } if reason.is_empty() => {
                write!(f, "closed by server (code {})", code)
            }
            CloseReason::Remote { code, reason } => {
                write!(f, "closed by server (code {}): {}", code, reason)
            }
            CloseReason::Dropped => write!(f, "connection dropped"),
            CloseReason::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("failed to load message history: {0}")]
    HistoryLoadFailure(String),

    #[error("realtime channel closed: {0}")]
    ChannelClosed(CloseReason),
}

impl SessionError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::HistoryLoadFailure("server is unavailable".to_string())
        } else if err.is_timeout() {
            Self::HistoryLoadFailure("request timed out".to_string())
        } else if let Some(status) = err.status() {
            Self::HistoryLoadFailure(format!("server returned {}", status))
        } else {
            Self::HistoryLoadFailure(err.to_string())
        }
    }

    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if is_connect {
            Self::ChannelClosed(CloseReason::Unavailable)
        } else {
            Self::ChannelClosed(CloseReason::Failed(err.to_string()))
        }
    }

    /// The close reason, for errors that end the realtime channel.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        match self {
            Self::ChannelClosed(reason) => Some(reason),
            Self::HistoryLoadFailure(_) => None,
        }
    }
}
