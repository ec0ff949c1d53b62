//! Dash configuration.
//!
//! Everything has a default, so an empty YAML document is a valid configuration:
//!
//! ```rust
//! use racedash::DashConfig;
//!
//! let config = DashConfig::from_yaml_str("address: 192.168.1.20:8070\n").unwrap();
//! assert_eq!(config.url(), "ws://192.168.1.20:8070/r3e");
//! assert_eq!(config.graph_capacity, 300);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::metrics::SpottingConfig;
use crate::transport::ChannelOptions;
use crate::types::{PollRate, ProtocolVersion};
use crate::{Result, TelemetryError};

/// Environment variable that replaces the configured bridge address.
pub const WS_ADDRESS_ENV: &str = "RACEDASH_WS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    /// `host:port` of the shared memory bridge
    pub address: String,
    pub path: String,
    pub connect_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    pub poll_rate: PollRate,
    /// Protocol version the dash was built against
    pub expected_version: ProtocolVersion,
    /// Samples kept per graphed field
    pub graph_capacity: usize,
    pub spotting: SpottingConfig,
    /// Where overrides and graph selections are persisted. In memory when unset.
    pub storage_dir: Option<PathBuf>,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8070".to_string(),
            path: "/r3e".to_string(),
            connect_timeout_ms: 2000,
            reconnect_interval_ms: 1000,
            poll_rate: PollRate::Native,
            expected_version: ProtocolVersion::default(),
            graph_capacity: crate::tracker::DEFAULT_CAPACITY,
            spotting: SpottingConfig::default(),
            storage_dir: None,
        }
    }
}

impl DashConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file and apply the environment override.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| TelemetryError::Config {
            details: format!("cannot read {}: {}", path.display(), e),
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(Self::from_yaml_str(&text)?.with_env_overrides())
    }

    /// Apply `RACEDASH_WS` if it is set and non-empty.
    pub fn with_env_overrides(self) -> Self {
        let address = std::env::var(WS_ADDRESS_ENV).ok();
        self.with_address_override(address.as_deref())
    }

    fn with_address_override(mut self, address: Option<&str>) -> Self {
        if let Some(address) = address.map(str::trim).filter(|a| !a.is_empty()) {
            debug!("Bridge address overridden to {}", address);
            self.address = address.to_string();
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(TelemetryError::Config { details: "address must not be empty".into() });
        }
        if self.graph_capacity == 0 {
            return Err(TelemetryError::Config { details: "graph_capacity must be at least 1".into() });
        }
        Ok(())
    }

    /// WebSocket URL of the bridge.
    pub fn url(&self) -> String {
        let path = self.path.trim_start_matches('/');
        format!("ws://{}/{}", self.address, path)
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
        }
    }
}
