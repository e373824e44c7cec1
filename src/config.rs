use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::events::DEFAULT_EVENT_BUFFER;
use crate::session::SessionConfig;
use crate::transcription::DEFAULT_LISTEN_URL;

/// Environment variable holding the provider credential
pub const API_KEY_ENV: &str = "DEEPGRAM_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub deepgram: DeepgramConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "crisis-voice".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeepgramConfig {
    /// Falls back to `DEEPGRAM_API_KEY` when unset
    pub api_key: Option<String>,
    pub url: String,
    pub model: String,
    pub language: String,
    pub smart_format: bool,
    pub connect_timeout_secs: u64,
    /// Idle interval between provider keep-alive messages
    pub keepalive_interval_secs: u64,
}

impl Default for DeepgramConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            url: DEFAULT_LISTEN_URL.to_string(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            smart_format: true,
            connect_timeout_secs: 10,
            keepalive_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub transcript_separator: String,
    /// Keep-alive interval for event-stream subscribers
    pub stream_keepalive_ms: u64,
    /// 0 disables idle-session expiry
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
    pub event_buffer: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            transcript_separator: " ".to_string(),
            stream_keepalive_ms: 1000,
            idle_timeout_secs: 300,
            reap_interval_secs: 30,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl VoiceConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            transcript_separator: self.transcript_separator.clone(),
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
            reap_interval: Duration::from_secs(self.reap_interval_secs.max(1)),
        }
    }

    pub fn stream_keepalive(&self) -> Duration {
        Duration::from_millis(self.stream_keepalive_ms.max(1))
    }
}

impl Config {
    /// Load config from an optional file overlaid by `CRISIS_*` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("CRISIS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        let mut cfg: Config = settings
            .try_deserialize()
            .context("Failed to parse config")?;

        if cfg.deepgram.api_key.is_none() {
            cfg.deepgram.api_key = std::env::var(API_KEY_ENV).ok();
        }

        Ok(cfg)
    }

    /// Whether a provider credential is present
    pub fn deepgram_enabled(&self) -> bool {
        self.deepgram
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}
