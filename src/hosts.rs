//! Static hostname overrides.

use std::net::IpAddr;
use std::sync::RwLock;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::error::{ForwardError, Result};

/// Hostname to address mappings consulted before the cache and upstreams.
///
/// Lookups are exact string matches; callers strip the trailing root dot.
#[async_trait]
pub trait Hosts: Send + Sync {
    async fn add(&self, hostname: &str, address: IpAddr) -> Result<()>;

    /// Returns `Ok(None)` if the hostname is not mapped.
    async fn get(&self, hostname: &str) -> Result<Option<IpAddr>>;
}

/// In-memory hosts table.
pub struct MemoryHosts {
    devices: RwLock<FxHashMap<String, IpAddr>>,
}

impl MemoryHosts {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(FxHashMap::default()),
        }
    }

    /// Build a table from `(hostname, address)` pairs.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, IpAddr)>,
        S: Into<String>,
    {
        let devices = entries
            .into_iter()
            .map(|(hostname, address)| (hostname.into(), address))
            .collect();

        Self {
            devices: RwLock::new(devices),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryHosts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hosts for MemoryHosts {
    async fn add(&self, hostname: &str, address: IpAddr) -> Result<()> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| ForwardError::backend("hosts lock poisoned"))?;
        devices.insert(hostname.to_string(), address);
        Ok(())
    }

    async fn get(&self, hostname: &str) -> Result<Option<IpAddr>> {
        let devices = self
            .devices
            .read()
            .map_err(|_| ForwardError::backend("hosts lock poisoned"))?;

        // An unspecified address counts as no mapping.
        Ok(devices
            .get(hostname)
            .copied()
            .filter(|address| !address.is_unspecified()))
    }
}
