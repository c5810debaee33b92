//! Configuration types.
//!
//! This module provides:
//! - Task and port mapping definitions (serde, JSON file format)
//! - The catalog seam that `TaskRegistry::list` reads from
//! - Relay settings shared by every task of a registry

mod catalog;
mod task;

use std::net::IpAddr;

pub use catalog::{MemoryCatalog, TaskCatalog};
pub use task::{PortMapping, TaskConfig};
pub(crate) use task::host_port;

use crate::constants::{DEFAULT_BUFFER_SIZE, DEFAULT_LISTEN_ADDR, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
use crate::error::{Error, Result};

/// Settings applied to every task started by a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address the listeners bind to (port comes from each mapping).
    pub listen_addr: IpAddr,
    /// Size of the intermediate buffer for each copy direction.
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl RelayConfig {
    /// Create a relay config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address.
    pub fn with_listen_addr(mut self, addr: IpAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Set the copy buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Check that the buffer size is within bounds.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(Error::invalid_config(format!(
                "buffer size {} out of range {}..={}",
                self.buffer_size, MIN_BUFFER_SIZE, MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn relay_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.listen_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn relay_config_builder() {
        let config = RelayConfig::new()
            .with_listen_addr(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_buffer_size(4096);

        assert_eq!(config.listen_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.buffer_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn relay_config_rejects_buffer_bounds() {
        assert!(RelayConfig::new().with_buffer_size(0).validate().is_err());
        assert!(RelayConfig::new()
            .with_buffer_size(MIN_BUFFER_SIZE - 1)
            .validate()
            .is_err());
        assert!(RelayConfig::new()
            .with_buffer_size(MAX_BUFFER_SIZE + 1)
            .validate()
            .is_err());
        assert!(RelayConfig::new()
            .with_buffer_size(MIN_BUFFER_SIZE)
            .validate()
            .is_ok());
    }
}
