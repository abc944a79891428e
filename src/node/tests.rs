use super::*;
use crate::config::FirstHopConfig;
use crate::identity::test_keys::{alice, bob};
use crate::store::{KeyStore, PeerRegistry};
use tempfile::TempDir;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn test_config() -> Config {
    let mut config = Config::new();
    config.transports.udp.bind_addr = Some("127.0.0.1:0".to_string());
    config.node.session.tick_interval_ms = 20;
    config.node.loopback_check = false;
    config
}

async fn start_node(config: Config, identity: Identity) -> Node {
    Node::start(config, MemoryStore::with_default_identity(identity))
        .await
        .unwrap()
}

async fn wait_for(
    events: &mut mpsc::Receiver<NodeEvent>,
    pred: impl Fn(&MuxEvent) -> bool,
) -> NodeEvent {
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event.event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll the registry until `thumbprint` shows up.
async fn eventually_known(node: &Node, thumbprint: &str) -> bool {
    for _ in 0..100 {
        if node
            .known_peers()
            .await
            .iter()
            .any(|p| p.thumbprint == thumbprint)
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_start_with_store_identity() {
    let node = start_node(test_config(), alice()).await;
    assert_eq!(node.thumbprint(), alice().thumbprint());
    assert!(node.list_public_endpoints().is_empty());
    assert!(!node.client().is_closed());
    node.stop().await;
}

#[tokio::test]
async fn test_key_file_overrides_store_default() {
    let dir = TempDir::new().unwrap();
    let key_file = dir.path().join("node.pem");
    std::fs::write(&key_file, bob().to_pem().unwrap()).unwrap();

    let mut config = test_config();
    config.node.identity.key_file = Some(key_file);

    let node = start_node(config, alice()).await;
    assert_eq!(node.thumbprint(), bob().thumbprint());

    let store = node.store();
    let default = store.lock().await.default_identity().unwrap();
    assert_eq!(default.thumbprint(), bob().thumbprint());
    drop(default);

    node.stop().await;
}

#[tokio::test]
async fn test_loopback_check() {
    let mut config = test_config();
    config.node.loopback_check = true;
    // Unspecified bind address is probed via 127.0.0.1
    config.transports.udp.bind_addr = Some("0.0.0.0:0".to_string());

    let mut node = start_node(config, alice()).await;
    let mut events = node.take_events().unwrap();
    assert!(node.take_events().is_none());

    node.loopback_check().await.unwrap();

    // The loopback handshake is anonymous and never recorded
    let established = wait_for(&mut events, |e| matches!(e, MuxEvent::Established { .. })).await;
    assert_eq!(established.local_addr, node.client().local_addr());
    assert!(matches!(
        established.event,
        MuxEvent::Established {
            thumbprint: None,
            anonymous: true,
            ..
        }
    ));
    assert!(node.known_peers().await.is_empty());

    node.stop().await;
}

#[tokio::test]
async fn test_public_endpoints() {
    let mut node = start_node(test_config(), alice()).await;

    let addr = node.create_public_endpoint(0).await.unwrap();
    let port = addr.port();
    assert_ne!(port, 0);
    assert_eq!(node.list_public_endpoints(), vec![port]);
    assert_eq!(node.store().lock().await.public_endpoints(), vec![port]);
    assert_eq!(node.endpoint(port).unwrap().local_addr(), addr);

    assert!(matches!(
        node.create_public_endpoint(port).await,
        Err(NodeError::EndpointExists(p)) if p == port
    ));

    node.remove_public_endpoint(port).await.unwrap();
    assert!(node.list_public_endpoints().is_empty());
    assert!(node.store().lock().await.public_endpoints().is_empty());
    assert!(matches!(
        node.remove_public_endpoint(port).await,
        Err(NodeError::EndpointNotFound(_))
    ));

    node.stop().await;
}

#[tokio::test]
async fn test_stored_endpoints_restart() {
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let mut store = MemoryStore::with_default_identity(alice());
    store.add_public_endpoint(port);

    let node = Node::start(test_config(), store).await.unwrap();
    assert_eq!(node.list_public_endpoints(), vec![port]);
    node.stop().await;
}

#[tokio::test]
async fn test_authenticated_peer_is_remembered() {
    let mut server = start_node(test_config(), alice()).await;
    let mut events = server.take_events().unwrap();
    let endpoint = server.create_public_endpoint(0).await.unwrap();

    let client = start_node(test_config(), bob()).await;
    client
        .client()
        .handshake(
            endpoint,
            alice().peer_key().clone(),
            Some(bob().thumbprint().to_string()),
        )
        .await
        .unwrap();

    let established = wait_for(&mut events, |e| matches!(e, MuxEvent::Established { .. })).await;
    assert_eq!(established.local_addr, endpoint);

    let peers = server.known_peers().await;
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].thumbprint, bob().thumbprint());
    assert_eq!(peers[0].address, client.client().local_addr());

    // The client side records the server it authenticated
    assert!(eventually_known(&client, alice().thumbprint()).await);

    client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_anonymous_peer_is_not_remembered() {
    let mut server = start_node(test_config(), alice()).await;
    let mut events = server.take_events().unwrap();
    let endpoint = server.create_public_endpoint(0).await.unwrap();

    let mut client = start_node(test_config(), bob()).await;
    let mut client_events = client.take_events().unwrap();
    client
        .client()
        .handshake(endpoint, alice().peer_key().clone(), None)
        .await
        .unwrap();

    wait_for(&mut events, |e| matches!(e, MuxEvent::Pong { .. })).await;
    assert!(server.known_peers().await.is_empty());

    // The initiator's pump has handled its Established event by the time it
    // forwards the pong that follows it
    wait_for(&mut client_events, |e| matches!(e, MuxEvent::Pong { .. })).await;
    assert!(client.known_peers().await.is_empty());

    client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_first_hops_from_config() {
    let dir = TempDir::new().unwrap();
    let key_file = dir.path().join("bob.pub.pem");
    std::fs::write(&key_file, bob().peer_key().to_pem().unwrap()).unwrap();

    let mut config = test_config();
    config.first_hops.push(
        FirstHopConfig::new("127.0.0.1:4000", bob().thumbprint()).with_public_key_file(&key_file),
    );
    config
        .first_hops
        .push(FirstHopConfig::new("127.0.0.1:4001", "ab".repeat(32)));

    let node = start_node(config, alice()).await;
    let store = node.store();
    {
        let store = store.lock().await;
        let hops = store.first_hops();
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].address, "127.0.0.1:4000".parse::<SocketAddr>().unwrap());
        assert_eq!(
            store.find_key(bob().thumbprint()).as_ref(),
            Some(bob().peer_key())
        );
    }
    node.stop().await;
}

#[tokio::test]
async fn test_first_hop_thumbprint_mismatch() {
    let dir = TempDir::new().unwrap();
    let key_file = dir.path().join("bob.pub.pem");
    std::fs::write(&key_file, bob().peer_key().to_pem().unwrap()).unwrap();

    let mut config = test_config();
    config.first_hops.push(
        FirstHopConfig::new("127.0.0.1:4000", alice().thumbprint()).with_public_key_file(&key_file),
    );

    let result = Node::start(config, MemoryStore::with_default_identity(alice())).await;
    assert!(matches!(result, Err(NodeError::ThumbprintMismatch { .. })));
}

#[tokio::test]
async fn test_invalid_first_hop_address() {
    let mut config = test_config();
    config
        .first_hops
        .push(FirstHopConfig::new("not an address", "ab".repeat(32)));

    let result = Node::start(config, MemoryStore::with_default_identity(alice())).await;
    assert!(matches!(
        result,
        Err(NodeError::Config(ConfigError::InvalidValue { .. }))
    ));
}

#[tokio::test]
async fn test_connect_first_hops() {
    let mut server = start_node(test_config(), bob()).await;
    let endpoint = server.create_public_endpoint(0).await.unwrap();

    let dir = TempDir::new().unwrap();
    let key_file = dir.path().join("bob.pub.pem");
    std::fs::write(&key_file, bob().peer_key().to_pem().unwrap()).unwrap();

    let mut config = test_config();
    config.first_hops.push(
        FirstHopConfig::new(endpoint.to_string(), bob().thumbprint()).with_public_key_file(&key_file),
    );
    // Registered without a key: cannot be reached
    config
        .first_hops
        .push(FirstHopConfig::new("127.0.0.1:9", "cd".repeat(32)));

    let client = start_node(config, alice()).await;
    let results = client.connect_first_hops().await;
    assert_eq!(results.len(), 2);

    let (hop, result) = &results[0];
    assert_eq!(hop.address, endpoint);
    assert!(result.is_ok());

    let (_, result) = &results[1];
    assert!(matches!(result, Err(NodeError::UnknownKey(_))));

    // The server learned our thumbprint
    assert!(eventually_known(&server, alice().thumbprint()).await);

    client.stop().await;
    server.stop().await;
}

#[test]
fn test_loopback_addr() {
    let bound: SocketAddr = "0.0.0.0:4000".parse().unwrap();
    assert_eq!(loopback_addr(bound), "127.0.0.1:4000".parse::<SocketAddr>().unwrap());

    let bound: SocketAddr = "[::]:4000".parse().unwrap();
    assert_eq!(loopback_addr(bound), "[::1]:4000".parse::<SocketAddr>().unwrap());

    let bound: SocketAddr = "192.0.2.1:4000".parse().unwrap();
    assert_eq!(loopback_addr(bound), bound);
}
