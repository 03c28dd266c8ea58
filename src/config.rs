use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const NOTIFICATIONS_PATH: &str = "/ws/notifications";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Runtime settings for one dashboard client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Explicit push endpoint base; derived from `api_url` when absent.
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_max_failures")]
    pub poll_max_failures: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Deadline for one push-channel connect, handshake included.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:8002".to_string()
}
fn default_reconnect_secs() -> u64 {
    5
}
fn default_poll_interval_secs() -> u64 {
    3
}
fn default_poll_max_failures() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: None,
            token: None,
            reconnect_secs: default_reconnect_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_max_failures: default_poll_max_failures(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl SyncConfig {
    /// Load settings from the process environment, reading a `.env` file first
    /// if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(api_url) = get("OFFERWATCH_API_URL") {
            config.api_url = api_url;
        }
        config.ws_url = get("OFFERWATCH_WS_URL");
        config.token = get("OFFERWATCH_TOKEN");
        if let Some(raw) = get("OFFERWATCH_RECONNECT_SECS") {
            config.reconnect_secs = parse_number("OFFERWATCH_RECONNECT_SECS", &raw)?;
        }
        if let Some(raw) = get("OFFERWATCH_POLL_SECS") {
            config.poll_interval_secs = parse_number("OFFERWATCH_POLL_SECS", &raw)?;
        }
        if let Some(raw) = get("OFFERWATCH_POLL_MAX_FAILURES") {
            config.poll_max_failures = parse_number("OFFERWATCH_POLL_MAX_FAILURES", &raw)?;
        }
        if let Some(raw) = get("OFFERWATCH_TIMEOUT_SECS") {
            config.timeout_secs = parse_number("OFFERWATCH_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = get("OFFERWATCH_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout_secs = parse_number("OFFERWATCH_CONNECT_TIMEOUT_SECS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let api_url = self.api_url.trim();
        if api_url.is_empty() {
            return Err(ConfigError::Missing("OFFERWATCH_API_URL"));
        }
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "OFFERWATCH_API_URL",
                value: self.api_url.clone(),
                reason: "expected an http:// or https:// URL".to_string(),
            });
        }
        if let Some(ws_url) = &self.ws_url {
            if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
                return Err(ConfigError::Invalid {
                    key: "OFFERWATCH_WS_URL",
                    value: ws_url.clone(),
                    reason: "expected a ws:// or wss:// URL".to_string(),
                });
            }
        }
        let non_zero = [
            ("OFFERWATCH_RECONNECT_SECS", self.reconnect_secs),
            ("OFFERWATCH_POLL_SECS", self.poll_interval_secs),
            ("OFFERWATCH_POLL_MAX_FAILURES", u64::from(self.poll_max_failures)),
            ("OFFERWATCH_TIMEOUT_SECS", self.timeout_secs),
            ("OFFERWATCH_CONNECT_TIMEOUT_SECS", self.connect_timeout_secs),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: "0".to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn api_base(&self) -> &str {
        self.api_url.trim().trim_end_matches('/')
    }

    /// Base URL of the push endpoint: the explicit override, or the API URL
    /// with its scheme swapped to the matching websocket scheme.
    pub fn ws_base(&self) -> String {
        if let Some(ws_url) = &self.ws_url {
            return ws_url.trim().trim_end_matches('/').to_string();
        }
        let api = self.api_base();
        if let Some(rest) = api.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = api.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            api.to_string()
        }
    }

    pub fn notifications_url(&self) -> String {
        format!("{}{}", self.ws_base(), NOTIFICATIONS_PATH)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|error: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: error.to_string(),
    })
}
