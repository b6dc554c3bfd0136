use anyhow::{Context, Result};
use meshcall_core::IceServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Client configuration. Every field has a default, so a TOML file only needs
/// the keys it wants to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// WebSocket endpoint of the relay.
    pub relay_url: String,
    pub connect_timeout_ms: u64,
    /// Capacity of the inbound roster event queue.
    pub event_buffer: usize,
    pub transport: TransportSettings,
    pub media: MediaSettings,
    pub rejoin: RejoinPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub negotiation_timeout_ms: u64,
    /// Used when the credential provider fails or returns nothing.
    pub fallback_ice_servers: Vec<IceServerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub capture_timeout_ms: u64,
}

/// What the session does when the relay connection drops on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RejoinPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8080/ws".to_owned(),
            connect_timeout_ms: 5_000,
            event_buffer: 256,
            transport: TransportSettings::default(),
            media: MediaSettings::default(),
            rejoin: RejoinPolicy::default(),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            negotiation_timeout_ms: 10_000,
            fallback_ice_servers: IceServerConfig::default_stun(),
        }
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            capture_timeout_ms: 10_000,
        }
    }
}

impl Default for RejoinPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff_ms: 1_000,
        }
    }
}

impl RejoinPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn allows(&self, attempts_made: u32) -> bool {
        self.enabled && attempts_made < self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl MeshConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse mesh config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize mesh config")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.negotiation_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.media.capture_timeout_ms)
    }
}
