//! Configuration for the telemetry pipeline
//!
//! Configuration is split in two: [`BrokerConfig`] covers everything the
//! transport thread needs to reach the MQTT broker (host, credentials,
//! keep-alive, TLS, reconnect policy), and [`PipelineConfig`] covers the
//! consumer-side tuning knobs (queue capacity, batch sizes, task cadences).
//! Both are serde structs persisted together as TOML.
//!
//! # File Location
//!
//! The default config file lives in the platform config directory:
//!
//! - **Linux**: `~/.config/twinlink/config.toml`
//! - **macOS**: `~/Library/Application Support/twinlink/config.toml`
//! - **Windows**: `%APPDATA%\twinlink\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use twinlink::config::TwinConfig;
//!
//! let config = TwinConfig::load_or_default();
//! println!("broker {}:{}", config.broker.host, config.broker.port);
//! config.save_default()?;
//! ```

use crate::error::{Result, TwinLinkError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for the config directory
pub const APP_ID: &str = "twinlink";

/// Config filename inside the app config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Default MQTT keep-alive interval in seconds
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

/// Default connect/handshake timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default number of consecutive failed attempts before the link gives up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default capacity of each cross-thread message queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default maximum messages drained/flushed per scheduler run
pub const DEFAULT_BATCH_DRAIN_SIZE: usize = 50;

/// Default maximum dirty sensors applied to visual consumers per run
pub const DEFAULT_BATCH_UPDATE_SIZE: usize = 50;

/// Broker connection settings consumed by the transport thread
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker hostname or address
    pub host: String,
    /// Broker port (1883 plain, 8883 TLS by convention)
    pub port: u16,
    /// Optional username credential
    pub username: Option<String>,
    /// Optional password credential
    pub password: Option<String>,
    /// Prefix for the generated client id
    pub client_id_prefix: String,
    /// MQTT keep-alive interval in seconds
    pub keep_alive_secs: u64,
    /// Handshake timeout in seconds
    pub connect_timeout_secs: u64,
    /// Consecutive failures before `PermanentlyFailed`
    pub max_reconnect_attempts: u32,
    /// TLS settings
    pub tls: TlsConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id_prefix: "twinlink".to_string(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            tls: TlsConfig::default(),
        }
    }
}

/// TLS channel settings
///
/// When `enabled` is false the remaining fields are ignored. The cert
/// fields are file paths read at connect time; a missing CA path with TLS
/// enabled is a configuration error surfaced on `connect`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Whether to wrap the connection in TLS
    pub enabled: bool,
    /// Trusted CA certificate path (PEM)
    pub ca_cert: Option<PathBuf>,
    /// Client certificate path for mutual TLS (PEM)
    pub client_cert: Option<PathBuf>,
    /// Client private key path for mutual TLS (PEM)
    pub client_key: Option<PathBuf>,
}

/// Consumer-side tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of each bounded message queue; overflow evicts the oldest
    pub queue_capacity: usize,
    /// Max messages drained from the inbound queue per drain run
    pub batch_drain_size: usize,
    /// Max dirty sensors applied to visual consumers per run
    pub batch_update_size: usize,
    /// Inbound drain cadence in milliseconds (~100 Hz)
    pub drain_interval_ms: u64,
    /// Outbound flush cadence in milliseconds (~10 Hz)
    pub flush_interval_ms: u64,
    /// Visual apply cadence in milliseconds (~10 Hz)
    pub visual_interval_ms: u64,
    /// Cosmetic refresh cadence in milliseconds (~2 Hz)
    pub refresh_interval_ms: u64,
    /// Metrics bookkeeping cadence in milliseconds (1 Hz)
    pub metrics_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_drain_size: DEFAULT_BATCH_DRAIN_SIZE,
            batch_update_size: DEFAULT_BATCH_UPDATE_SIZE,
            drain_interval_ms: 10,
            flush_interval_ms: 100,
            visual_interval_ms: 100,
            refresh_interval_ms: 500,
            metrics_interval_ms: 1000,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinConfig {
    /// Broker connection settings
    pub broker: BrokerConfig,
    /// Pipeline tuning
    pub pipeline: PipelineConfig,
}

impl TwinConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&text)
            .map_err(|e| TwinLinkError::Config(format!("invalid config file: {}", e)))
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| TwinLinkError::Config(format!("failed to serialize config: {}", e)))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    /// Load from the default location, falling back to defaults
    ///
    /// A malformed file logs a warning and falls back rather than failing
    /// startup.
    pub fn load_or_default() -> Self {
        match default_config_path() {
            Some(path) if path.exists() => match Self::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// Save to the default location
    pub fn save_default(&self) -> Result<()> {
        let path = default_config_path()
            .ok_or_else(|| TwinLinkError::Config("no config directory available".to_string()))?;
        self.save(path)?;
        Ok(())
    }
}

/// Path of the default config file, if a config directory exists
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}
