//! Free Speech Node
//!
//! Top-level orchestration: bootstraps the default identity through the
//! key store, seeds the first-hop registry from configuration, runs one
//! multiplexer per public endpoint plus a client multiplexer for outbound
//! sessions, and checks on startup that the node can reach itself.
//!
//! Every multiplexer's events flow through a pump task that records
//! authenticated peers in the registry and forwards the event to the
//! node's event channel. Anonymous peers are never recorded.

use crate::config::{Config, ConfigError};
use crate::identity::{Identity, IdentityError, PeerKey};
use crate::mux::{MuxConfig, MuxError, MuxEvent, Multiplexer, MultiplexerHandle};
use crate::store::{FirstHop, KnownPeer, MemoryStore, Store};
use crate::utils::index::SessionId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Errors related to node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("multiplexer error: {0}")]
    Mux(#[from] MuxError),

    #[error("no default identity available")]
    NoIdentity,

    #[error("public endpoint already running on port {0}")]
    EndpointExists(u16),

    #[error("no public endpoint on port {0}")]
    EndpointNotFound(u16),

    #[error("no public key known for thumbprint {0}")]
    UnknownKey(String),

    #[error("key file for first hop {expected} has thumbprint {actual}")]
    ThumbprintMismatch { expected: String, actual: String },

    #[error("loopback check failed: {0}")]
    Loopback(String),
}

/// A multiplexer event, tagged with the socket it happened on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeEvent {
    pub local_addr: SocketAddr,
    pub event: MuxEvent,
}

/// A running node.
pub struct Node<S: Store = MemoryStore> {
    config: Config,
    identity: Arc<Identity>,
    store: Arc<Mutex<S>>,
    /// Outbound sessions.
    client: MultiplexerHandle,
    /// Public endpoints by bound port.
    endpoints: BTreeMap<u16, MultiplexerHandle>,
    pumps: Vec<JoinHandle<()>>,
    events_tx: mpsc::Sender<NodeEvent>,
    events_rx: Option<mpsc::Receiver<NodeEvent>>,
}

impl<S: Store> Node<S> {
    /// Start a node.
    ///
    /// The default identity comes from the configured key file when one is
    /// set, otherwise from the store, otherwise it is generated and stored
    /// as the default. Public endpoints are the union of the configured
    /// ports and those already recorded in the store.
    pub async fn start(config: Config, store: S) -> Result<Self, NodeError> {
        let store = Arc::new(Mutex::new(store));

        let identity = bootstrap_identity(&config, &store).await?;
        info!(thumbprint = %identity.thumbprint(), "Default identity");

        register_first_hops(&config, &store).await?;

        let (events_tx, events_rx) = mpsc::channel(config.node.session.event_buffer.max(1));
        let (client, client_events) =
            Multiplexer::bind(MuxConfig::from_config(&config), identity.clone(), None).await?;
        info!(local_addr = %client.local_addr(), "Client multiplexer started");

        let mut node = Node {
            config,
            identity,
            store,
            client,
            endpoints: BTreeMap::new(),
            pumps: Vec::new(),
            events_tx,
            events_rx: Some(events_rx),
        };
        node.spawn_pump(node.client.local_addr(), client_events);

        let mut ports: BTreeSet<u16> = node.config.endpoints.iter().copied().collect();
        ports.extend(node.store.lock().await.public_endpoints());
        for port in ports {
            node.create_public_endpoint(port).await?;
        }

        if node.config.node.loopback_check {
            match node.loopback_check().await {
                Ok(()) => info!("Loopback connection established"),
                Err(e) => warn!(error = %e, "Loopback connection failed"),
            }
        }

        info!(
            public_endpoints = node.endpoints.len(),
            "Node started"
        );
        Ok(node)
    }

    // === Accessors ===

    /// The default identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Thumbprint of the default identity.
    pub fn thumbprint(&self) -> &str {
        self.identity.thumbprint()
    }

    /// Handle to the client multiplexer.
    pub fn client(&self) -> &MultiplexerHandle {
        &self.client
    }

    /// Handle to the public endpoint on `port`.
    pub fn endpoint(&self, port: u16) -> Option<&MultiplexerHandle> {
        self.endpoints.get(&port)
    }

    /// The backing store.
    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    /// Take the event receiver. Returns None after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<NodeEvent>> {
        self.events_rx.take()
    }

    /// Peers that completed a handshake with a thumbprint.
    pub async fn known_peers(&self) -> Vec<KnownPeer> {
        self.store.lock().await.known_peers()
    }

    // === Public endpoints ===

    /// Serve on `port` (0 for an ephemeral port) and record it.
    ///
    /// Returns the bound address.
    pub async fn create_public_endpoint(&mut self, port: u16) -> Result<SocketAddr, NodeError> {
        if port != 0 && self.endpoints.contains_key(&port) {
            return Err(NodeError::EndpointExists(port));
        }

        let (handle, events) = Multiplexer::bind(
            MuxConfig::from_config(&self.config),
            self.identity.clone(),
            Some(port),
        )
        .await?;
        let local_addr = handle.local_addr();
        self.spawn_pump(local_addr, events);
        self.store.lock().await.add_public_endpoint(local_addr.port());
        self.endpoints.insert(local_addr.port(), handle);

        info!(local_addr = %local_addr, "Public endpoint started");
        Ok(local_addr)
    }

    /// Stop serving on `port` and forget it.
    pub async fn remove_public_endpoint(&mut self, port: u16) -> Result<(), NodeError> {
        let handle = self
            .endpoints
            .remove(&port)
            .ok_or(NodeError::EndpointNotFound(port))?;
        handle.close().await;
        self.store.lock().await.remove_public_endpoint(port);
        info!(port, "Public endpoint stopped");
        Ok(())
    }

    /// Ports of the running public endpoints, ascending.
    pub fn list_public_endpoints(&self) -> Vec<u16> {
        self.endpoints.keys().copied().collect()
    }

    // === Outbound ===

    /// Handshake from the client multiplexer with every registered first
    /// hop, presenting the default thumbprint.
    pub async fn connect_first_hops(&self) -> Vec<(FirstHop, Result<SessionId, NodeError>)> {
        let hops: Vec<(FirstHop, Option<PeerKey>)> = {
            let store = self.store.lock().await;
            store
                .first_hops()
                .into_iter()
                .map(|hop| {
                    let key = store.find_key(&hop.thumbprint);
                    (hop, key)
                })
                .collect()
        };

        let mut results = Vec::with_capacity(hops.len());
        for (hop, key) in hops {
            let result = match key {
                Some(key) => self
                    .client
                    .handshake(hop.address, key, Some(self.thumbprint().to_string()))
                    .await
                    .map_err(NodeError::from),
                None => Err(NodeError::UnknownKey(hop.thumbprint.clone())),
            };
            match &result {
                Ok(session_id) => {
                    info!(address = %hop.address, session_id = %session_id, "Connected to first hop")
                }
                Err(e) => warn!(address = %hop.address, error = %e, "First hop unreachable"),
            }
            results.push((hop, result));
        }
        results
    }

    /// Handshake anonymously with our own client multiplexer over
    /// loopback using our own key, and wait for the keep-alive answer.
    pub async fn loopback_check(&self) -> Result<(), NodeError> {
        let target = loopback_addr(self.client.local_addr());
        let (probe, events) = Multiplexer::bind(
            MuxConfig::from_config(&self.config),
            self.identity.clone(),
            None,
        )
        .await?;

        let wait = Duration::from_millis(self.config.node.session.handshake_timeout_ms);
        let result = probe_loopback(&probe, events, target, self.identity.peer_key(), wait).await;
        probe.close().await;
        result
    }

    // === Lifecycle ===

    /// Close every multiplexer and wait for the event pumps to drain.
    pub async fn stop(self) {
        for handle in self.endpoints.values() {
            handle.close().await;
        }
        self.client.close().await;
        for pump in self.pumps {
            let _ = pump.await;
        }
        info!("Node stopped");
    }

    fn spawn_pump(&mut self, local_addr: SocketAddr, mut events: mpsc::Receiver<MuxEvent>) {
        let store = Arc::clone(&self.store);
        let forward = self.events_tx.clone();
        self.pumps.push(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let MuxEvent::Established {
                    peer,
                    thumbprint: Some(thumbprint),
                    anonymous: false,
                    ..
                } = &event
                {
                    debug!(peer = %peer, thumbprint = %thumbprint, "Remembering peer");
                    store.lock().await.remember_peer(thumbprint, *peer);
                }
                if let Err(TrySendError::Full(_)) = forward.try_send(NodeEvent { local_addr, event })
                {
                    trace!(local_addr = %local_addr, "Node event channel full");
                }
            }
        }));
    }
}

impl<S: Store> fmt::Debug for Node<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("thumbprint", &self.thumbprint())
            .field("client", &self.client.local_addr())
            .field("endpoints", &self.list_public_endpoints())
            .finish()
    }
}

async fn bootstrap_identity<S: Store>(
    config: &Config,
    store: &Mutex<S>,
) -> Result<Arc<Identity>, NodeError> {
    let mut store = store.lock().await;
    if config.has_identity() {
        store.add_key(config.create_identity()?, true);
    } else if store.default_identity().is_none() {
        let bits = config.node.identity.key_bits();
        info!(bits, "Generating default identity, this may take a while");
        store.add_key(Identity::generate(bits)?, true);
    }
    store.default_identity().ok_or(NodeError::NoIdentity)
}

async fn register_first_hops<S: Store>(config: &Config, store: &Mutex<S>) -> Result<(), NodeError> {
    let mut store = store.lock().await;
    for hop in &config.first_hops {
        let address = hop.socket_addr()?;
        if let Some(path) = &hop.public_key_file {
            let key = PeerKey::load(path)?;
            if key.thumbprint() != hop.thumbprint {
                return Err(NodeError::ThumbprintMismatch {
                    expected: hop.thumbprint.clone(),
                    actual: key.thumbprint().to_string(),
                });
            }
            store.add_public_key(key);
        }
        store.add_first_hop(FirstHop {
            address,
            thumbprint: hop.thumbprint.clone(),
        });
        debug!(address = %address, thumbprint = %hop.thumbprint, "Registered first hop");
    }
    Ok(())
}

async fn probe_loopback(
    probe: &MultiplexerHandle,
    mut events: mpsc::Receiver<MuxEvent>,
    target: SocketAddr,
    key: &PeerKey,
    wait: Duration,
) -> Result<(), NodeError> {
    probe.handshake(target, key.clone(), None).await?;

    let pong = tokio::time::timeout(wait, async {
        while let Some(event) = events.recv().await {
            if let MuxEvent::Pong { .. } = event {
                return true;
            }
        }
        false
    })
    .await;

    match pong {
        Ok(true) => Ok(()),
        _ => Err(NodeError::Loopback("no keep-alive answer".to_string())),
    }
}

/// The address to reach a socket bound to `addr` from this host.
fn loopback_addr(addr: SocketAddr) -> SocketAddr {
    if !addr.ip().is_unspecified() {
        return addr;
    }
    let ip = match addr.ip() {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
    };
    SocketAddr::new(ip, addr.port())
}

#[cfg(test)]
mod tests;
