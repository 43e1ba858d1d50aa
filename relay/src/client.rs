//! Connect to a relay, authenticate and exchange messages with other clients.

use crate::{
    identity::{self, AuthError},
    wire::{self, Delivery, Request},
};
use rand::rngs::OsRng;
use shield_cryptography::{PrivateKey, PublicKey};
use shield_stream::{
    handshake,
    transport::{Sink, Stream},
    ChannelError, HandshakeError, Receiver, Sender,
};
use std::{fs, io::ErrorKind, path::Path};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Errors that can occur when running a client.
#[derive(Error, Debug)]
pub enum Error {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid client id file")]
    InvalidClientId,
}

/// Configuration for a [Client].
#[derive(Clone)]
pub struct Config {
    /// Identity key proving ownership of `client_id`.
    pub identity: PrivateKey,

    /// Identity key the relay must sign its handshake with.
    pub server: PublicKey,

    /// Identifier other clients address messages to.
    pub client_id: String,

    /// Framing, handshake and replay settings.
    pub stream: shield_stream::Config,
}

/// An authenticated connection to a relay.
pub struct Client<Si: Sink, St: Stream> {
    client_id: String,
    outbox: Outbox<Si>,
    inbox: Inbox<St>,
}

impl<Si: Sink, St: Stream> Client<Si, St> {
    /// Run the handshake and prove ownership of the configured identifier.
    pub async fn connect(cfg: Config, sink: Si, stream: St) -> Result<Self, Error> {
        let connection =
            handshake::connect(&mut OsRng, &cfg.stream, &cfg.server, sink, stream).await?;
        let (mut sender, mut receiver) = connection.split();
        identity::prove(&cfg.identity, &cfg.client_id, &mut sender, &mut receiver).await?;
        info!(client_id = %cfg.client_id, "connected to relay");
        Ok(Self {
            client_id: cfg.client_id,
            outbox: Outbox { sender },
            inbox: Inbox { receiver },
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Ask the relay to forward `text` to `target`.
    pub async fn send_to(&mut self, target: &str, text: &str) -> Result<(), Error> {
        self.outbox.send_to(target, text).await
    }

    /// Wait for the next message forwarded by the relay.
    pub async fn recv(&mut self) -> Result<Delivery, Error> {
        self.inbox.recv().await
    }

    /// Split the client so sending and receiving can run concurrently.
    pub fn split(self) -> (Outbox<Si>, Inbox<St>) {
        (self.outbox, self.inbox)
    }
}

/// Sending half of a [Client].
pub struct Outbox<Si: Sink> {
    sender: Sender<Si>,
}

impl<Si: Sink> Outbox<Si> {
    /// Ask the relay to forward `text` to `target`.
    ///
    /// Delivery is best-effort: nothing is returned if the target is offline.
    pub async fn send_to(&mut self, target: &str, text: &str) -> Result<(), Error> {
        let request = Request {
            target: target.to_string(),
            text: text.to_string(),
        };
        self.sender.send(&wire::encode(&request)).await?;
        Ok(())
    }
}

/// Receiving half of a [Client].
pub struct Inbox<St: Stream> {
    receiver: Receiver<St>,
}

impl<St: Stream> Inbox<St> {
    /// Wait for the next message forwarded by the relay.
    ///
    /// Deliveries that do not parse are logged and skipped.
    pub async fn recv(&mut self) -> Result<Delivery, Error> {
        loop {
            let msg = self.receiver.recv().await?;
            match wire::decode(&msg) {
                Ok(delivery) => return Ok(delivery),
                Err(err) => debug!(%err, "skipping malformed delivery"),
            }
        }
    }
}

/// Read the client identifier stored at `path`, or generate a random one and store it there.
pub fn load_or_generate_id(path: &Path) -> Result<String, Error> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let client_id = contents.trim();
            if client_id.is_empty() {
                return Err(Error::InvalidClientId);
            }
            debug!(client_id, "loaded client id");
            Ok(client_id.to_string())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let client_id = Uuid::new_v4().to_string();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &client_id)?;
            info!(%client_id, "generated client id");
            Ok(client_id)
        }
        Err(err) => Err(err.into()),
    }
}
