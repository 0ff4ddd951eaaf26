use serde::{Deserialize, Serialize};

/// The authenticated user a session is opened for.
///
/// Only `username` is used by the session (it addresses the realtime
/// channel). The token is held for the lifetime of the session but is not
/// transmitted anywhere.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub token: String,
}

impl Identity {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// A single chat message, as returned by the history endpoint and as
/// delivered by the realtime channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub username: String,
    pub text: String,
}

impl Message {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.username, self.text)
    }
}
