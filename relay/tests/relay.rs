use prometheus_client::registry::Registry;
use shield_cryptography::PrivateKey;
use shield_relay::{
    client::{self, Client},
    router, server,
    trust::{Memory, TrustOnFirstUse},
};
use shield_stream::{tcp, transport::Listener as _};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::{sleep, timeout};

struct Relay {
    address: SocketAddr,
    identity: PrivateKey,
    router: router::Mailbox,
}

async fn start_relay() -> Relay {
    let registry = Arc::new(Mutex::new(Registry::default()));
    let (actor, mailbox) = router::Actor::new(router::Config {
        registry: registry.clone(),
        mailbox_size: 1024,
    });
    tokio::spawn(actor.run());

    let identity = PrivateKey::from_seed(0);
    let trust = TrustOnFirstUse::new(Memory::default()).unwrap();
    let server = server::Server::new(
        server::Config::new(identity.clone(), trust, registry),
        mailbox.clone(),
    );
    let listener = tcp::Network::default()
        .bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(server.run(listener));
    Relay {
        address,
        identity,
        router: mailbox,
    }
}

async fn connect(
    relay: &Relay,
    client_id: &str,
    identity: PrivateKey,
) -> Result<Client<tcp::Sink, tcp::Stream>, client::Error> {
    let (sink, stream) = tcp::Network::default().dial(relay.address).await.unwrap();
    let cfg = client::Config {
        identity,
        server: relay.identity.public_key(),
        client_id: client_id.to_string(),
        stream: Default::default(),
    };
    Client::connect(cfg, sink, stream).await
}

async fn wait_online(relay: &Relay, client_id: &str) {
    for _ in 0..200 {
        if relay.router.online(client_id.to_string()).await {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("{client_id} never came online");
}

#[tokio::test]
async fn test_messages_are_forwarded() {
    let relay = start_relay().await;
    let mut alice = connect(&relay, "alice", PrivateKey::from_seed(1))
        .await
        .unwrap();
    let mut bob = connect(&relay, "bob", PrivateKey::from_seed(2))
        .await
        .unwrap();
    wait_online(&relay, "alice").await;
    wait_online(&relay, "bob").await;

    alice.send_to("bob", "hello bob").await.unwrap();
    let delivery = timeout(Duration::from_secs(5), bob.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.sender, "alice");
    assert_eq!(delivery.text, "hello bob");

    bob.send_to("alice", "hi alice").await.unwrap();
    let delivery = timeout(Duration::from_secs(5), alice.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.sender, "bob");
    assert_eq!(delivery.text, "hi alice");
}

#[tokio::test]
async fn test_offline_target_is_dropped() {
    let relay = start_relay().await;
    let mut alice = connect(&relay, "alice", PrivateKey::from_seed(1))
        .await
        .unwrap();
    let mut bob = connect(&relay, "bob", PrivateKey::from_seed(2))
        .await
        .unwrap();
    wait_online(&relay, "alice").await;
    wait_online(&relay, "bob").await;

    // Nothing reaches anyone for an unknown target
    alice.send_to("carol", "are you there?").await.unwrap();
    alice.send_to("bob", "after carol").await.unwrap();
    let delivery = timeout(Duration::from_secs(5), bob.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.text, "after carol");
    assert!(timeout(Duration::from_millis(100), alice.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_pinned_key_enforced() {
    let relay = start_relay().await;
    let alice = connect(&relay, "alice", PrivateKey::from_seed(1))
        .await
        .unwrap();
    wait_online(&relay, "alice").await;
    drop(alice);
    for _ in 0..200 {
        if !relay.router.online("alice".to_string()).await {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    // Another key claiming the same identifier is rejected
    let result = connect(&relay, "alice", PrivateKey::from_seed(3)).await;
    if let Ok(mut impostor) = result {
        assert!(timeout(Duration::from_secs(5), impostor.recv())
            .await
            .unwrap()
            .is_err());
    }
    assert!(!relay.router.online("alice".to_string()).await);

    // The original key still works
    let _alice = connect(&relay, "alice", PrivateKey::from_seed(1))
        .await
        .unwrap();
    wait_online(&relay, "alice").await;
}

#[tokio::test]
async fn test_duplicate_identifier_rejected() {
    let relay = start_relay().await;
    let mut first = connect(&relay, "alice", PrivateKey::from_seed(1))
        .await
        .unwrap();
    wait_online(&relay, "alice").await;

    // The second connection is closed without displacing the first
    if let Ok(mut second) = connect(&relay, "alice", PrivateKey::from_seed(1)).await {
        assert!(timeout(Duration::from_secs(5), second.recv())
            .await
            .unwrap()
            .is_err());
    }

    let mut bob = connect(&relay, "bob", PrivateKey::from_seed(2))
        .await
        .unwrap();
    wait_online(&relay, "bob").await;
    bob.send_to("alice", "still here?").await.unwrap();
    let delivery = timeout(Duration::from_secs(5), first.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.sender, "bob");
}

#[tokio::test]
async fn test_wrong_relay_identity_rejected() {
    let relay = start_relay().await;
    let (sink, stream) = tcp::Network::default().dial(relay.address).await.unwrap();
    let cfg = client::Config {
        identity: PrivateKey::from_seed(1),
        server: PrivateKey::from_seed(42).public_key(),
        client_id: "alice".to_string(),
        stream: Default::default(),
    };
    assert!(matches!(
        Client::connect(cfg, sink, stream).await,
        Err(client::Error::Handshake(_))
    ));
}
