use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [server]
//                    http_url = "http://chat.example:8000"
//
//   env var:         CHAT_SERVER__HTTP_URL=http://chat.example:8000
//
//   (single underscore stays within field names: CHAT_HISTORY__TIMEOUT_SECS)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub history: HistoryFileConfig,
    #[serde(default)]
    pub channel: ChannelFileConfig,
}

/// Where the chat backend lives (`[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerFileConfig {
    #[serde(default = "default_http_url")]
    pub http_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
            ws_url: default_ws_url(),
        }
    }
}

/// History request tunables (`[history]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryFileConfig {
    #[serde(default = "default_history_path")]
    pub path: String,
    #[serde(default)]
    pub skip: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    /// 0 waits forever.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for HistoryFileConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            skip: None,
            limit: None,
            timeout_secs: 0,
        }
    }
}

/// Realtime channel tunables (`[channel]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelFileConfig {
    #[serde(default = "default_channel_path")]
    pub path: String,
    /// 0 waits forever.
    #[serde(default)]
    pub connect_timeout_secs: u64,
}

impl Default for ChannelFileConfig {
    fn default() -> Self {
        Self {
            path: default_channel_path(),
            connect_timeout_secs: 0,
        }
    }
}

fn default_http_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_ws_url() -> String {
    "ws://localhost:8000".to_string()
}
fn default_history_path() -> String {
    "/messages/".to_string()
}
fn default_channel_path() -> String {
    "/ws".to_string()
}

/// Build a figment that layers: defaults → config.toml → CHAT_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `CHAT_SERVER__WS_URL=ws://chat:9000`  →  `server.ws_url = "ws://chat:9000"`
///   `CHAT_HISTORY__LIMIT=50`  →  `history.limit = 50`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("CHAT_").split("__"))
}

impl FileConfig {
    /// Point both endpoints at one server. The websocket URL is derived from
    /// the HTTP one (`http` → `ws`, `https` → `wss`).
    pub fn with_server_override(mut self, server: Option<&str>) -> Self {
        if let Some(url) = server {
            let url = url.trim_end_matches('/');
            self.server.ws_url = websocket_url_for(url);
            self.server.http_url = url.to_string();
        }
        self
    }
}

fn websocket_url_for(http_url: &str) -> String {
    if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        http_url.to_string()
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn optional_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

// =============================================================================
// Runtime config (derived from FileConfig, handed to the session library)
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub history_url: String,
    pub history_skip: Option<u32>,
    pub history_limit: Option<u32>,
    pub history_timeout: Option<Duration>,
    /// Channel URLs are `<channel_base>/<username>`.
    pub channel_base: String,
    pub connect_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            history_url: join_url(&fc.server.http_url, &fc.history.path),
            history_skip: fc.history.skip,
            history_limit: fc.history.limit,
            history_timeout: optional_secs(fc.history.timeout_secs),
            channel_base: join_url(&fc.server.ws_url, &fc.channel.path),
            connect_timeout: optional_secs(fc.channel.connect_timeout_secs),
        }
    }
}

// =============================================================================
// Directory layout (not tunable via figment; derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub data_dir: PathBuf,
}

impl ChatConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".chatroom"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
