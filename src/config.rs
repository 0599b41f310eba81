//! Client configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables, then command-line overrides applied by the binary.
//!
//! ```toml
//! api_url = "http://chat.example.org:8000"
//! ws_url = "ws://chat.example.org:8000"
//! poll_interval_secs = 5
//!
//! [reconnect]
//! enabled = true
//! max_attempts = 5
//! ```

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::error::ModchatError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000";

pub const ENV_API_URL: &str = "MODCHAT_API_URL";
pub const ENV_WS_URL: &str = "MODCHAT_WS_URL";
pub const ENV_POLL_SECS: &str = "MODCHAT_POLL_SECS";

/// Exponential backoff for automatic reconnection of the realtime session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Give up after this many consecutive failed attempts.
    pub max_attempts: u32,
    /// Fraction of the delay added as random jitter, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Base delay for 1-based `attempt`, without jitter: doubles each attempt
    /// and saturates at `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << shift;
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay for 1-based `attempt` with jitter applied. Never exceeds
    /// `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=jitter);
        base.mul_f64(1.0 + extra).min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && attempt <= self.max_attempts
    }
}

/// Runtime configuration for the session client, the REST client and the
/// stats poller.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the HTTP API (e.g. `http://localhost:8000`).
    pub api_url: String,
    /// Base URL of the WebSocket host (e.g. `ws://localhost:8000`).
    pub ws_url: String,
    /// How often to poll `/api/stats`.
    pub poll_interval: Duration,
    /// TCP connection timeout for HTTP requests.
    pub connect_timeout: Duration,
    /// Per-request timeout for HTTP requests.
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            poll_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// On-disk shape. Every field is optional; absent fields keep the default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    ws_url: Option<String>,
    poll_interval_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    reconnect: Option<FileReconnect>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileReconnect {
    enabled: Option<bool>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
    jitter: Option<f64>,
}

impl ClientConfig {
    /// Load defaults, overlay `path` if given, then overlay the process
    /// environment. Not validated: command-line overrides still apply on top,
    /// so callers run [`ClientConfig::validate`] once everything is layered.
    pub fn load(path: Option<&Path>) -> Result<Self, ModchatError> {
        let mut cfg = Self::default();
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                ModchatError::Config(format!("cannot read {}: {e}", path.display()))
            })?;
            cfg.apply_toml(&raw)?;
        }
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Overlay values from a TOML document.
    pub fn apply_toml(&mut self, raw: &str) -> Result<(), ModchatError> {
        let file: FileConfig =
            toml::from_str(raw).map_err(|e| ModchatError::Config(e.to_string()))?;

        if let Some(url) = file.api_url {
            self.api_url = normalize_base_url(&url);
        }
        if let Some(url) = file.ws_url {
            self.ws_url = normalize_base_url(&url);
        }
        if let Some(secs) = file.poll_interval_secs {
            self.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(r) = file.reconnect {
            if let Some(enabled) = r.enabled {
                self.reconnect.enabled = enabled;
            }
            if let Some(ms) = r.initial_delay_ms {
                self.reconnect.initial_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = r.max_delay_ms {
                self.reconnect.max_delay = Duration::from_millis(ms);
            }
            if let Some(n) = r.max_attempts {
                self.reconnect.max_attempts = n;
            }
            if let Some(j) = r.jitter {
                self.reconnect.jitter = j;
            }
        }
        Ok(())
    }

    /// Overlay values from environment variables, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ModchatError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_url = normalize_base_url(&url);
        }
        if let Some(url) = lookup(ENV_WS_URL).filter(|v| !v.trim().is_empty()) {
            self.ws_url = normalize_base_url(&url);
        }
        if let Some(raw) = lookup(ENV_POLL_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ModchatError::Config(format!("{ENV_POLL_SECS} must be an integer, got '{raw}'"))
            })?;
            self.poll_interval = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<(), ModchatError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ModchatError::Config(format!(
                "api_url must start with http:// or https://, got '{}'",
                self.api_url
            )));
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ModchatError::Config(format!(
                "ws_url must start with ws:// or wss://, got '{}'",
                self.ws_url
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ModchatError::Config("poll interval must be positive".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ModchatError::Config("connect timeout must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ModchatError::Config("request timeout must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(ModchatError::Config(format!(
                "reconnect jitter must be within [0, 1], got {}",
                self.reconnect.jitter
            )));
        }
        Ok(())
    }

    /// `{ws_url}/ws/{identifier}` with the identifier percent-encoded as a
    /// single path segment.
    pub fn session_url(&self, identifier: &str) -> String {
        format!("{}/ws/{}", self.ws_url, urlencoding::encode(identifier))
    }
}

/// Trim surrounding whitespace and trailing slashes.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
