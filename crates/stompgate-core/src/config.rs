//! Configuration resolution for StompGate.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (<config_dir>/stompgate/settings.json)
//! 3. Explicit config file (--config), replacing the global file
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Default STOMP broker port.
pub const DEFAULT_BROKER_PORT: u16 = 61613;

/// Complete StompGate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub relay: RelaySettings,
}

/// Where and how to reach the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub tcp_nodelay: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_BROKER_PORT,
            connect_timeout_secs: 10,
            tcp_nodelay: true,
        }
    }
}

impl BrokerConfig {
    /// `host:port` suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Relay-side limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelaySettings {
    /// Largest inbound frame accepted before the session is torn down.
    pub max_frame_bytes: usize,
    /// Capacity of the channel carrying messages back to the local bus.
    pub bus_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_frame_bytes: 1024 * 1024, // 1 MiB
            bus_capacity: 1024,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        config = load_config_file(&global_path)?;
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("stompgate").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("STOMPGATE_BROKER_HOST") {
        config.broker.host = val;
    }
    if let Some(n) = var("STOMPGATE_BROKER_PORT").and_then(|v| v.parse().ok()) {
        config.broker.port = n;
    }
    if let Some(n) = var("STOMPGATE_CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.broker.connect_timeout_secs = n;
    }
    if let Some(n) = var("STOMPGATE_MAX_FRAME_BYTES").and_then(|v| v.parse().ok()) {
        config.relay.max_frame_bytes = n;
    }
}
