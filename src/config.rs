use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::AudioBackendConfig;
use crate::capture::{CaptureConfig, UploadPolicy};

/// Environment variable prefix, e.g. `SCRIBE_CAPTURE__STORE__BASE_URL`
pub const ENV_PREFIX: &str = "SCRIBE_CAPTURE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub store: StoreConfig,
    pub capture: CaptureSettings,
    pub audio: AudioConfig,
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
            name: "scribe-capture".to_string(),
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
            bind: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

/// Remote session store connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_token: None,
            request_timeout_secs: 60,
        }
    }
}

/// Capture timing and upload policy, as written in the config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub rotation_interval_secs: u64,
    pub tick_interval_ms: u64,
    pub upload_max_attempts: u32,
    pub upload_initial_backoff_ms: u64,
    pub upload_max_backoff_ms: u64,
    /// Per-attempt upload timeout; unset means no timeout
    pub upload_timeout_secs: Option<u64>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        let defaults = CaptureConfig::default();
        Self {
            rotation_interval_secs: defaults.rotation_interval.as_secs(),
            tick_interval_ms: defaults.tick_interval.as_millis() as u64,
            upload_max_attempts: defaults.upload.max_attempts,
            upload_initial_backoff_ms: defaults.upload.initial_backoff.as_millis() as u64,
            upload_max_backoff_ms: defaults.upload.max_backoff.as_millis() as u64,
            upload_timeout_secs: defaults.upload.attempt_timeout.map(|t| t.as_secs()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_duration_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let defaults = AudioBackendConfig::default();
        Self {
            sample_rate: defaults.target_sample_rate,
            channels: defaults.target_channels,
            buffer_duration_ms: defaults.buffer_duration_ms,
        }
    }
}

impl Config {
    /// Load from an optional config file, overridden by `SCRIBE_CAPTURE__*` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        let c = &self.capture;
        CaptureConfig {
            rotation_interval: Duration::from_secs(c.rotation_interval_secs.max(1)),
            tick_interval: Duration::from_millis(c.tick_interval_ms.max(1)),
            upload: UploadPolicy {
                max_attempts: c.upload_max_attempts.max(1),
                initial_backoff: Duration::from_millis(c.upload_initial_backoff_ms),
                max_backoff: Duration::from_millis(c.upload_max_backoff_ms),
                attempt_timeout: c.upload_timeout_secs.map(Duration::from_secs),
            },
        }
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.sample_rate,
            target_channels: self.audio.channels,
            buffer_duration_ms: self.audio.buffer_duration_ms,
        }
    }
}
