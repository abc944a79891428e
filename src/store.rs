//! Key and peer persistence.
//!
//! The node keeps its key pairs, first-hop servers, public endpoint ports
//! and the peers it has authenticated behind two traits. `MemoryStore`
//! implements both; a document database can slot in behind the same
//! seams. Only the node writes here: multiplexers report events and the
//! node decides what is worth remembering.

use crate::identity::{Identity, PeerKey};
use crate::utils::now_ms;
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// A server suited for initial session establishment.
#[derive(Clone, Debug, PartialEq)]
pub struct FirstHop {
    pub address: SocketAddr,
    pub thumbprint: String,
}

/// A peer that completed a handshake and presented a thumbprint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnownPeer {
    pub thumbprint: String,
    pub address: SocketAddr,
    /// Unix milliseconds of the first handshake.
    pub first_seen_ms: u64,
    /// Unix milliseconds of the most recent handshake.
    pub last_seen_ms: u64,
}

/// Key pair and public key storage.
pub trait KeyStore {
    /// The identity this node presents by default.
    fn default_identity(&self) -> Option<Arc<Identity>>;

    /// Look up a public key by thumbprint, private or public-only.
    fn find_key(&self, thumbprint: &str) -> Option<PeerKey>;

    /// Store a key pair. Returns false if it was already stored; the
    /// default flag is still applied.
    fn add_key(&mut self, identity: Identity, is_default: bool) -> bool;

    /// Store a public key. Returns false if it was already stored.
    fn add_public_key(&mut self, key: PeerKey) -> bool;
}

/// First hops, public endpoints and authenticated peers.
pub trait PeerRegistry {
    /// Register a first hop, replacing any entry with the same thumbprint.
    fn add_first_hop(&mut self, hop: FirstHop) -> bool;

    /// Forget every first hop with `thumbprint`.
    fn remove_first_hop(&mut self, thumbprint: &str) -> bool;

    fn first_hops(&self) -> Vec<FirstHop>;

    /// Record a port to serve on. Returns false if already recorded.
    fn add_public_endpoint(&mut self, port: u16) -> bool;

    fn remove_public_endpoint(&mut self, port: u16) -> bool;

    /// Recorded ports, ascending.
    fn public_endpoints(&self) -> Vec<u16>;

    /// Note a successful handshake with a thumbprinted peer.
    fn remember_peer(&mut self, thumbprint: &str, address: SocketAddr);

    fn find_peer(&self, thumbprint: &str) -> Option<KnownPeer>;

    fn known_peers(&self) -> Vec<KnownPeer>;
}

/// Everything the node needs from its backing store.
pub trait Store: KeyStore + PeerRegistry + Send + 'static {}

impl<T: KeyStore + PeerRegistry + Send + 'static> Store for T {}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    identities: HashMap<String, Arc<Identity>>,
    public_keys: HashMap<String, PeerKey>,
    default_thumbprint: Option<String>,
    first_hops: Vec<FirstHop>,
    endpoints: BTreeSet<u16>,
    peers: HashMap<String, KnownPeer>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose default identity is `identity`.
    pub fn with_default_identity(identity: Identity) -> Self {
        let mut store = Self::new();
        store.add_key(identity, true);
        store
    }

    /// Number of stored key pairs.
    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }
}

impl KeyStore for MemoryStore {
    fn default_identity(&self) -> Option<Arc<Identity>> {
        self.default_thumbprint
            .as_ref()
            .and_then(|t| self.identities.get(t))
            .cloned()
    }

    fn find_key(&self, thumbprint: &str) -> Option<PeerKey> {
        self.identities
            .get(thumbprint)
            .map(|identity| identity.peer_key().clone())
            .or_else(|| self.public_keys.get(thumbprint).cloned())
    }

    fn add_key(&mut self, identity: Identity, is_default: bool) -> bool {
        let thumbprint = identity.thumbprint().to_string();
        if is_default {
            self.default_thumbprint = Some(thumbprint.clone());
        }
        if self.identities.contains_key(&thumbprint) {
            return false;
        }
        debug!(thumbprint = %thumbprint, is_default, "Stored key pair");
        self.identities.insert(thumbprint, Arc::new(identity));
        true
    }

    fn add_public_key(&mut self, key: PeerKey) -> bool {
        let thumbprint = key.thumbprint().to_string();
        if self.public_keys.contains_key(&thumbprint) {
            return false;
        }
        self.public_keys.insert(thumbprint, key);
        true
    }
}

impl PeerRegistry for MemoryStore {
    fn add_first_hop(&mut self, hop: FirstHop) -> bool {
        let replaced = self.remove_first_hop(&hop.thumbprint);
        self.first_hops.push(hop);
        !replaced
    }

    fn remove_first_hop(&mut self, thumbprint: &str) -> bool {
        let before = self.first_hops.len();
        self.first_hops.retain(|hop| hop.thumbprint != thumbprint);
        self.first_hops.len() != before
    }

    fn first_hops(&self) -> Vec<FirstHop> {
        self.first_hops.clone()
    }

    fn add_public_endpoint(&mut self, port: u16) -> bool {
        self.endpoints.insert(port)
    }

    fn remove_public_endpoint(&mut self, port: u16) -> bool {
        self.endpoints.remove(&port)
    }

    fn public_endpoints(&self) -> Vec<u16> {
        self.endpoints.iter().copied().collect()
    }

    fn remember_peer(&mut self, thumbprint: &str, address: SocketAddr) {
        let now = now_ms();
        self.peers
            .entry(thumbprint.to_string())
            .and_modify(|peer| {
                peer.address = address;
                peer.last_seen_ms = now;
            })
            .or_insert_with(|| KnownPeer {
                thumbprint: thumbprint.to_string(),
                address,
                first_seen_ms: now,
                last_seen_ms: now,
            });
    }

    fn find_peer(&self, thumbprint: &str) -> Option<KnownPeer> {
        self.peers.get(thumbprint).cloned()
    }

    fn known_peers(&self) -> Vec<KnownPeer> {
        let mut peers: Vec<KnownPeer> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.thumbprint.cmp(&b.thumbprint));
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::test_keys::{alice, bob};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_default_identity() {
        let mut store = MemoryStore::new();
        assert!(store.default_identity().is_none());

        assert!(store.add_key(alice(), false));
        assert!(store.default_identity().is_none());

        assert!(store.add_key(bob(), true));
        assert_eq!(
            store.default_identity().unwrap().thumbprint(),
            bob().thumbprint()
        );

        // Re-adding promotes without duplicating
        assert!(!store.add_key(alice(), true));
        assert_eq!(
            store.default_identity().unwrap().thumbprint(),
            alice().thumbprint()
        );
        assert_eq!(store.identity_count(), 2);
    }

    #[test]
    fn test_find_key() {
        let mut store = MemoryStore::with_default_identity(alice());
        assert_eq!(
            store.find_key(alice().thumbprint()).as_ref(),
            Some(alice().peer_key())
        );
        assert!(store.find_key(bob().thumbprint()).is_none());

        assert!(store.add_public_key(bob().peer_key().clone()));
        assert!(!store.add_public_key(bob().peer_key().clone()));
        assert_eq!(
            store.find_key(bob().thumbprint()).as_ref(),
            Some(bob().peer_key())
        );
    }

    #[test]
    fn test_first_hops() {
        let mut store = MemoryStore::new();
        assert!(store.add_first_hop(FirstHop {
            address: addr(4000),
            thumbprint: "aa".into(),
        }));
        assert!(store.add_first_hop(FirstHop {
            address: addr(4001),
            thumbprint: "bb".into(),
        }));

        // Same thumbprint replaces
        assert!(!store.add_first_hop(FirstHop {
            address: addr(4002),
            thumbprint: "aa".into(),
        }));
        let hops = store.first_hops();
        assert_eq!(hops.len(), 2);
        assert!(hops.iter().any(|h| h.thumbprint == "aa" && h.address == addr(4002)));

        assert!(store.remove_first_hop("bb"));
        assert!(!store.remove_first_hop("bb"));
        assert_eq!(store.first_hops().len(), 1);
    }

    #[test]
    fn test_public_endpoints() {
        let mut store = MemoryStore::new();
        assert!(store.add_public_endpoint(4001));
        assert!(store.add_public_endpoint(4000));
        assert!(!store.add_public_endpoint(4000));
        assert_eq!(store.public_endpoints(), vec![4000, 4001]);

        assert!(store.remove_public_endpoint(4001));
        assert!(!store.remove_public_endpoint(4001));
        assert_eq!(store.public_endpoints(), vec![4000]);
    }

    #[test]
    fn test_remember_peer_updates_address() {
        let mut store = MemoryStore::new();
        store.remember_peer("cc", addr(5000));
        let first = store.find_peer("cc").unwrap();
        assert_eq!(first.address, addr(5000));

        store.remember_peer("cc", addr(5001));
        let second = store.find_peer("cc").unwrap();
        assert_eq!(second.address, addr(5001));
        assert_eq!(second.first_seen_ms, first.first_seen_ms);
        assert!(second.last_seen_ms >= first.last_seen_ms);

        store.remember_peer("bb", addr(5002));
        let thumbprints: Vec<String> = store
            .known_peers()
            .into_iter()
            .map(|p| p.thumbprint)
            .collect();
        assert_eq!(thumbprints, vec!["bb", "cc"]);
    }
}
