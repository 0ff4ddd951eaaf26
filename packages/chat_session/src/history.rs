//! One-shot retrieval of the message history.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::SessionError;
use crate::models::Message;

/// Read-only access to the backing message store.
///
/// Returns the full ordered history, oldest first.
pub trait HistorySource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Vec<Message>, SessionError>> + Send;
}

/// History over HTTP: `GET <url>` returning a JSON array of
/// `{"username", "text"}` records.
#[derive(Clone, Debug)]
pub struct HttpHistory {
    client: reqwest::Client,
    url: String,
    skip: Option<u32>,
    limit: Option<u32>,
    timeout: Option<Duration>,
}

impl HttpHistory {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("chat-session/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            skip: None,
            limit: None,
            timeout: None,
        }
    }

    /// Ask the store for a window of the history instead of its default page.
    pub fn with_page(mut self, skip: Option<u32>, limit: Option<u32>) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }

    /// Give up on the request after `timeout`. No timeout by default.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn query(&self) -> Vec<(&'static str, u32)> {
        let mut query = Vec::new();
        if let Some(skip) = self.skip {
            query.push(("skip", skip));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit));
        }
        query
    }
}

impl HistorySource for HttpHistory {
    async fn fetch(&self) -> Result<Vec<Message>, SessionError> {
        debug!("Fetching history from {}", self.url);

        let mut request = self.client.get(&self.url);
        let query = self.query();
        if !query.is_empty() {
            request = request.query(&query);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let messages: Vec<Message> = request
            .send()
            .await
            .map_err(SessionError::from_reqwest)?
            .error_for_status()
            .map_err(SessionError::from_reqwest)?
            .json()
            .await
            .map_err(SessionError::from_reqwest)?;

        info!("Loaded {} history messages", messages.len());
        Ok(messages)
    }
}
