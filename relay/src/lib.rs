//! Relay end-to-end encrypted chat messages between authenticated clients.
//!
//! # Overview
//!
//! A relay accepts connections, secures each one with [shield_stream::handshake] and then
//! authenticates the client on the other end (see [identity]). Authenticated connections are
//! registered with the [router] under the client's identifier. Every message a client sends names
//! a target identifier: the relay decrypts it under the sender's session key, hands it to the
//! target's connection and re-encrypts it there under the target's session key. Messages for
//! clients that are not connected are dropped.
//!
//! # Trust
//!
//! Clients learn the relay's identity key out-of-band. The relay learns client keys on first
//! contact and pins them (see [trust]): later connections claiming the same identifier must
//! prove possession of the pinned key.
//!
//! # Example
//!
//! ```no_run
//! use prometheus_client::registry::Registry;
//! use shield_cryptography::PrivateKey;
//! use shield_relay::{router, server, trust::{Memory, TrustOnFirstUse}};
//! use shield_stream::tcp;
//! use std::sync::{Arc, Mutex};
//!
//! # async fn run() {
//! let registry = Arc::new(Mutex::new(Registry::default()));
//! let (router, mailbox) = router::Actor::new(router::Config {
//!     registry: registry.clone(),
//!     mailbox_size: 1024,
//! });
//! tokio::spawn(router.run());
//!
//! let identity = PrivateKey::from_seed(0);
//! let trust = TrustOnFirstUse::new(Memory::default()).unwrap();
//! let server = server::Server::new(server::Config::new(identity, trust, registry), mailbox);
//! let listener = tcp::Network::default()
//!     .bind("127.0.0.1:9000".parse().unwrap())
//!     .await
//!     .unwrap();
//! server.run(listener).await;
//! # }
//! ```

pub mod client;
pub mod identity;
pub use identity::AuthError;
pub mod router;
pub use router::{RegistryError, RouteResult};
pub mod server;
pub mod trust;
pub mod wire;
