//! The authoritative in-memory peer registry.
//!
//! Every lookup and mutation serializes through one `std::sync::Mutex`;
//! no reader/writer split is needed at the scale of a chat peer set. The
//! lock is never held across network I/O — callers snapshot what they
//! need and release before sending.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A single known peer and the metadata we've learned about it.
#[derive(Debug, Clone)]
pub struct Peer {
    pub user_id: String,
    pub display_name: String,
    pub addr: SocketAddr,
    pub public_key_b64: String,
    pub last_seen: Instant,
}

/// Outcome of an `upsert_from_presence` call, used to decide whether to
/// reply with our own presence to complete the two-way mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    New,
    AddressChanged,
    Refreshed,
}

/// A read-only view of a peer suitable for exposing to the collaborator,
/// without leaking the internal `Instant` representation.
#[derive(Debug, Clone)]
pub struct PeerView {
    pub display_name: String,
    pub seconds_since_last_seen: u64,
}

#[derive(Default)]
struct Inner {
    peers: HashMap<String, Peer>,
}

/// Thread-safe peer registry keyed by user-id.
pub struct PeerTable {
    inner: Mutex<Inner>,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Insert a newly-announced peer, update an address change, or just
    /// refresh liveness for one that's already known at the same address.
    pub fn upsert_from_presence(
        &self,
        user_id: &str,
        display_name: &str,
        addr: SocketAddr,
        public_key_b64: &str,
    ) -> UpsertOutcome {
        let mut inner = self.inner.lock().expect("peer table mutex poisoned");
        let now = Instant::now();

        match inner.peers.get_mut(user_id) {
            None => {
                inner.peers.insert(
                    user_id.to_string(),
                    Peer {
                        user_id: user_id.to_string(),
                        display_name: display_name.to_string(),
                        addr,
                        public_key_b64: public_key_b64.to_string(),
                        last_seen: now,
                    },
                );
                UpsertOutcome::New
            }
            Some(peer) => {
                let address_changed = peer.addr != addr;
                if peer.last_seen < now {
                    peer.last_seen = now;
                }
                if address_changed {
                    peer.addr = addr;
                    peer.display_name = display_name.to_string();
                    peer.public_key_b64 = public_key_b64.to_string();
                    UpsertOutcome::AddressChanged
                } else {
                    // Same address: last-seen only — a
                    // re-announcement at an unchanged address must not
                    // overwrite fields a live Session already depends on.
                    UpsertOutcome::Refreshed
                }
            }
        }
    }

    /// Remove a peer (and implicitly its session, which the caller drops
    /// from the `SessionCache` separately — the two stores are not fused
    /// so that the crypto cache can outlive brief table churn if desired).
    pub fn mark_offline(&self, user_id: &str) -> bool {
        let mut inner = self.inner.lock().expect("peer table mutex poisoned");
        inner.peers.remove(user_id).is_some()
    }

    pub fn touch(&self, user_id: &str) {
        let mut inner = self.inner.lock().expect("peer table mutex poisoned");
        if let Some(peer) = inner.peers.get_mut(user_id) {
            let now = Instant::now();
            if peer.last_seen < now {
                peer.last_seen = now;
            }
        }
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Peer> {
        let inner = self.inner.lock().expect("peer table mutex poisoned");
        inner
            .peers
            .values()
            .find(|p| p.display_name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<Peer> {
        let inner = self.inner.lock().expect("peer table mutex poisoned");
        inner.peers.values().find(|p| p.addr == addr).cloned()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        let inner = self.inner.lock().expect("peer table mutex poisoned");
        inner.peers.contains_key(user_id)
    }

    /// Remove every peer whose last-seen predates `now - ttl`. Returns the
    /// evicted peers (not just their ids) so the caller can both drop their
    /// sessions and notify the collaborator with a display name rather than
    /// a raw user-id.
    pub fn evict_stale(&self, ttl: Duration) -> Vec<Peer> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("peer table mutex poisoned");
        let stale: Vec<Peer> = inner
            .peers
            .values()
            .filter(|p| now.saturating_duration_since(p.last_seen) > ttl)
            .cloned()
            .collect();
        for peer in &stale {
            inner.peers.remove(&peer.user_id);
        }
        stale
    }

    /// A consistent snapshot of every peer's address, for fan-out sends
    /// (ping sweep, presence broadcast) prepared under the lock and then
    /// executed outside of it.
    pub fn snapshot_addrs(&self) -> Vec<(String, SocketAddr)> {
        let inner = self.inner.lock().expect("peer table mutex poisoned");
        inner
            .peers
            .values()
            .map(|p| (p.user_id.clone(), p.addr))
            .collect()
    }

    /// A consistent snapshot for `list_peers`.
    pub fn snapshot(&self) -> Vec<PeerView> {
        let now = Instant::now();
        let inner = self.inner.lock().expect("peer table mutex poisoned");
        inner
            .peers
            .values()
            .map(|p| PeerView {
                display_name: p.display_name.clone(),
                seconds_since_last_seen: now.saturating_duration_since(p.last_seen).as_secs(),
            })
            .collect()
    }
}
