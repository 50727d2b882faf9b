/**
 * overlay/peers.rs
 *
 * Authoritative peer table and roster diffing
 */

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use tracing::{info, warn};

use super::types::Endpoint;

/// Live set of reachable peers, keyed by the `"ip:port"` of the chosen
/// target address. This map is the only source of outbound destinations.
///
/// Two writers populate it: roster diffing (which also removes) and the
/// demultiplexer (first inbound datagram). Roster removals win; packet
/// arrival inserts only when absent.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<String, SocketAddr>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Insert a peer first seen through an inbound datagram. Returns true
    /// when the peer was not known before.
    pub fn insert_if_absent(&mut self, key: &str, addr: SocketAddr) -> bool {
        if self.peers.contains_key(key) {
            return false;
        }
        self.peers.insert(key.to_string(), addr);
        true
    }

    /// Diff one roster delivery against the table. Entries describing the
    /// local endpoint are skipped; peers absent from the roster are
    /// removed; peers not yet in the table are returned so the caller can
    /// schedule hole-punch bursts. Insertion itself is deferred to the
    /// demultiplexer, so an unreachable peer is re-punched on every
    /// delivery until its first datagram lands.
    pub fn apply_roster(
        &mut self,
        roster: &[Endpoint],
        local: &Endpoint,
    ) -> Vec<(String, SocketAddr)> {
        let mut active = HashSet::new();
        let mut fresh = Vec::new();
        for entry in roster {
            if entry.is_local(local) {
                continue;
            }
            let key = entry.target_key(local);
            let addr: SocketAddr = match key.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    warn!(%key, "skipping unresolvable roster entry: {}", e);
                    continue;
                }
            };
            if !self.peers.contains_key(&key) {
                fresh.push((key.clone(), addr));
            }
            active.insert(key);
        }
        self.peers.retain(|key, _| {
            let keep = active.contains(key);
            if !keep {
                info!(%key, "peer left the room");
            }
            keep
        });
        fresh
    }

    /// Copy of the live peer set for the send paths: taken under the table
    /// lock, used after it is released.
    pub fn snapshot(&self) -> Vec<(String, SocketAddr)> {
        self.peers
            .iter()
            .map(|(key, addr)| (key.clone(), *addr))
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.peers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
