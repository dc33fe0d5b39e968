//! Client configuration

use std::env;
use std::time::Duration;

use support_chat_shared::UserId;
use url::Url;

/// Timers that drive the chat state machines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatTimings {
    /// Delay before a foreground view reconnects after an unrequested close
    pub foreground_reconnect: Duration,
    /// Delay before the background listener reconnects
    pub background_reconnect: Duration,
    /// Minimum spacing between outbound `isTyping=true` frames
    pub typing_throttle: Duration,
    /// How long a remote typing indicator survives without renewal
    pub typing_expiry: Duration,
    /// Admin directory poll interval
    pub directory_poll: Duration,
}

impl Default for ChatTimings {
    fn default() -> Self {
        Self {
            foreground_reconnect: Duration::from_millis(3000),
            background_reconnect: Duration::from_millis(5000),
            typing_throttle: Duration::from_millis(2000),
            typing_expiry: Duration::from_millis(3000),
            directory_poll: Duration::from_millis(10000),
        }
    }
}

/// Client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Backend
    pub api_url: Url,
    pub request_timeout_ms: u64,

    // Identity
    pub auth_token: Option<String>,
    pub user_id: Option<UserId>,

    // Timers
    pub foreground_reconnect_ms: u64,
    pub background_reconnect_ms: u64,
    pub typing_throttle_ms: u64,
    pub typing_expiry_ms: u64,
    pub directory_poll_ms: u64,

    // Logging
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = env::var("CHAT_API_URL").map_err(|_| ConfigError::Missing("CHAT_API_URL"))?;
        let api_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::Invalid("CHAT_API_URL", e.to_string()))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(
                "CHAT_API_URL",
                format!("expected http or https, got {}", api_url.scheme()),
            ));
        }

        Ok(Self {
            api_url,
            request_timeout_ms: millis("CHAT_REQUEST_TIMEOUT_MS", 30000),

            auth_token: env::var("CHAT_AUTH_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
            user_id: env::var("CHAT_USER_ID").ok().and_then(|id| UserId::parse(id).ok()),

            foreground_reconnect_ms: millis("CHAT_FOREGROUND_RECONNECT_MS", 3000),
            background_reconnect_ms: millis("CHAT_BACKGROUND_RECONNECT_MS", 5000),
            typing_throttle_ms: millis("CHAT_TYPING_THROTTLE_MS", 2000),
            typing_expiry_ms: millis("CHAT_TYPING_EXPIRY_MS", 3000),
            directory_poll_ms: millis("CHAT_DIRECTORY_POLL_MS", 10000),

            log_json: env::var("LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }

    pub fn timings(&self) -> ChatTimings {
        ChatTimings {
            foreground_reconnect: Duration::from_millis(self.foreground_reconnect_ms),
            background_reconnect: Duration::from_millis(self.background_reconnect_ms),
            typing_throttle: Duration::from_millis(self.typing_throttle_ms),
            typing_expiry: Duration::from_millis(self.typing_expiry_ms),
            directory_poll: Duration::from_millis(self.directory_poll_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn millis(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
