// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Protocol engine configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoapError;
use crate::message::DEFAULT_PORT;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: IpAddr,
    /// UDP port (0 picks an ephemeral port).
    pub port: u16,
    /// Maximum concurrently running handlers.
    pub max_workers: usize,
    /// Receive buffer size; longer datagrams are truncated by the socket.
    pub max_datagram_size: usize,
    /// Block transfers idle longer than this are discarded (seconds).
    pub block_idle_timeout_secs: u64,
    /// Minimum spacing between housekeeping sweeps (seconds).
    pub sweep_interval_secs: u64,
    /// Observer registrations older than this are evicted (seconds, 0 = never).
    pub observer_ttl_secs: u64,
    /// Enable SO_BROADCAST for presence announcements.
    pub broadcast: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_workers: 10,
            max_datagram_size: 1500,
            block_idle_timeout_secs: 15,
            sweep_interval_secs: 10,
            observer_ttl_secs: 600,
            broadcast: true,
        }
    }
}

impl ServerConfig {
    /// Loopback, ephemeral port. Used by tests and local tools.
    pub fn localhost() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            broadcast: false,
            ..Self::default()
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn block_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.block_idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// `None` when observer eviction is disabled.
    pub fn observer_ttl(&self) -> Option<Duration> {
        (self.observer_ttl_secs > 0).then(|| Duration::from_secs(self.observer_ttl_secs))
    }

    pub fn validate(&self) -> Result<(), CoapError> {
        if self.max_workers == 0 {
            return Err(CoapError::Config("max_workers must be > 0".into()));
        }
        if self.max_datagram_size < 64 {
            return Err(CoapError::Config(format!(
                "max_datagram_size too small: {}",
                self.max_datagram_size
            )));
        }
        if self.block_idle_timeout_secs == 0 {
            return Err(CoapError::Config("block_idle_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 5683);
        assert_eq!(cfg.max_workers, 10);
        assert_eq!(cfg.block_idle_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(10));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let cfg = ServerConfig {
            max_workers: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(CoapError::Config(_))));
    }

    #[test]
    fn test_observer_ttl_disabled() {
        let cfg = ServerConfig {
            observer_ttl_secs: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.observer_ttl(), None);
    }
}
