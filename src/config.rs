//! Forwarder configuration.
//!
//! Stored as JSON with PascalCase keys:
//!
//! ```json
//! {
//!   "ReadTimeout": 10,
//!   "WriteTimeout": 10,
//!   "NameServers": ["208.67.222.222:53", "208.67.220.220:53"],
//!   "TTL": 600,
//!   "Hosts": { "raspberrypi": "192.168.1.201" }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::resolver::DEFAULT_TTL;
use crate::transport::Timeouts;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Configuration {
    /// Seconds to wait for a read from a client or nameserver.
    pub read_timeout: u64,

    /// Seconds to wait for a write to a client or nameserver.
    pub write_timeout: u64,

    /// Upstream nameservers in failover order.
    pub name_servers: Vec<SocketAddr>,

    /// TTL of answers synthesized from `Hosts`.
    #[serde(rename = "TTL", default = "default_ttl")]
    pub ttl: u32,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, IpAddr>,
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            read_timeout: 10,
            write_timeout: 10,
            name_servers: vec![
                SocketAddr::from(([208, 67, 222, 222], 53)),
                SocketAddr::from(([208, 67, 220, 220], 53)),
            ],
            ttl: DEFAULT_TTL,
            hosts: BTreeMap::new(),
        }
    }
}

impl Configuration {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_json(&contents)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_timeout == 0 {
            return Err(ConfigError::Validation(
                "ReadTimeout must be greater than zero".to_string(),
            ));
        }
        if self.write_timeout == 0 {
            return Err(ConfigError::Validation(
                "WriteTimeout must be greater than zero".to_string(),
            ));
        }
        if let Some(hostname) = self.hosts.keys().find(|h| h.is_empty() || h.ends_with('.')) {
            return Err(ConfigError::Validation(format!(
                "invalid hosts entry '{hostname}': names are matched without a trailing dot"
            )));
        }
        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from_secs(self.read_timeout, self.write_timeout)
    }
}
