// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Observer registry: path -> peer -> token.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One registered observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observer {
    pub peer: SocketAddr,
    pub token: Vec<u8>,
    pub registered: Instant,
}

/// Observers per resource path.
///
/// A peer observes a path at most once; registering again replaces the
/// token and refreshes the registration time.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    paths: HashMap<String, BTreeMap<SocketAddr, Observer>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the peer was not observing `path` before.
    pub fn register(&mut self, path: &str, peer: SocketAddr, token: &[u8], now: Instant) -> bool {
        self.paths
            .entry(path.to_string())
            .or_default()
            .insert(
                peer,
                Observer {
                    peer,
                    token: token.to_vec(),
                    registered: now,
                },
            )
            .is_none()
    }

    pub fn deregister(&mut self, path: &str, peer: SocketAddr) -> bool {
        let Some(peers) = self.paths.get_mut(path) else {
            return false;
        };
        let removed = peers.remove(&peer).is_some();
        if peers.is_empty() {
            self.paths.remove(path);
        }
        removed
    }

    /// Snapshot of the observers of `path`, ordered by peer address.
    pub fn observers(&self, path: &str) -> Vec<Observer> {
        self.paths
            .get(path)
            .map(|peers| peers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove registrations older than `ttl`. Returns how many.
    pub fn evict_older_than(&mut self, now: Instant, ttl: Duration) -> usize {
        let mut evicted = 0;
        self.paths.retain(|_, peers| {
            let before = peers.len();
            peers.retain(|_, o| now.saturating_duration_since(o.registered) <= ttl);
            evicted += before - peers.len();
            !peers.is_empty()
        });
        evicted
    }

    /// Total registrations across all paths.
    pub fn len(&self) -> usize {
        self.paths.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 20], port))
    }

    #[test]
    fn test_register_replaces_token() {
        let mut reg = ObserverRegistry::new();
        let now = Instant::now();
        assert!(reg.register("/sensors", addr(1), &[1], now));
        assert!(!reg.register("/sensors", addr(1), &[2], now));

        let obs = reg.observers("/sensors");
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].token, vec![2]);
    }

    #[test]
    fn test_deregister() {
        let mut reg = ObserverRegistry::new();
        let now = Instant::now();
        reg.register("/a", addr(1), &[1], now);
        reg.register("/a", addr(2), &[2], now);

        assert!(reg.deregister("/a", addr(1)));
        assert!(!reg.deregister("/a", addr(1)));
        assert!(!reg.deregister("/missing", addr(1)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_evict_stale() {
        let mut reg = ObserverRegistry::new();
        let start = Instant::now();
        reg.register("/a", addr(1), &[1], start);
        reg.register("/b", addr(2), &[2], start + Duration::from_secs(50));

        let evicted = reg.evict_older_than(start + Duration::from_secs(70), Duration::from_secs(60));
        assert_eq!(evicted, 1);
        assert!(reg.observers("/a").is_empty());
        assert_eq!(reg.observers("/b").len(), 1);
    }
}
