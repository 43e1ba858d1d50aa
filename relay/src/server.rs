//! Accept connections, authenticate clients and forward their messages.

use crate::{
    identity::{Claim, Verifier, MIN_CHALLENGE_LENGTH},
    router::{self, Relay, RouteResult},
    trust::TrustPolicy,
    wire::{self, Delivery, Request},
};
use commonware_macros::select;
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use rand::rngs::OsRng;
use shield_cryptography::PrivateKey;
use shield_stream::{
    handshake,
    transport::{Listener, Sink, Stream},
    ChannelError, Receiver, Sender,
};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};

/// Configuration for the relay [Server].
#[derive(Clone)]
pub struct Config<T: TrustPolicy> {
    /// Long-lived identity that signs every handshake.
    pub identity: PrivateKey,

    /// Framing, handshake and replay settings applied to every connection.
    pub stream: shield_stream::Config,

    /// Policy deciding which key a client identifier is bound to.
    pub trust: T,

    /// Size of the random challenge issued to clients (in bytes).
    pub challenge_length: usize,

    /// Number of deliveries queued per connection before further ones are dropped.
    pub mailbox_size: usize,

    /// Registry that server metrics are registered in.
    pub registry: Arc<Mutex<Registry>>,
}

impl<T: TrustPolicy> Config<T> {
    /// Returns a config with default settings.
    pub fn new(identity: PrivateKey, trust: T, registry: Arc<Mutex<Registry>>) -> Self {
        Self {
            identity,
            stream: shield_stream::Config::default(),
            trust,
            challenge_length: MIN_CHALLENGE_LENGTH,
            mailbox_size: 1024,
            registry,
        }
    }
}

#[derive(Clone)]
struct Metrics {
    connections_accepted: Counter,
    handshakes_failed: Counter,
    authentications_failed: Counter,
}

impl Metrics {
    fn init(registry: &Arc<Mutex<Registry>>) -> Self {
        let metrics = Self {
            connections_accepted: Counter::default(),
            handshakes_failed: Counter::default(),
            authentications_failed: Counter::default(),
        };
        let mut registry = registry.lock().unwrap();
        registry.register(
            "connections_accepted",
            "connections accepted",
            metrics.connections_accepted.clone(),
        );
        registry.register(
            "handshakes_failed",
            "connections that failed the handshake",
            metrics.handshakes_failed.clone(),
        );
        registry.register(
            "authentications_failed",
            "connections that failed authentication",
            metrics.authentications_failed.clone(),
        );
        metrics
    }
}

/// Serves clients on a [Listener].
#[derive(Clone)]
pub struct Server<T: TrustPolicy> {
    identity: Arc<PrivateKey>,
    stream: shield_stream::Config,
    verifier: Verifier<T>,
    router: router::Mailbox,
    mailbox_size: usize,
    metrics: Metrics,
}

impl<T: TrustPolicy> Server<T> {
    pub fn new(cfg: Config<T>, router: router::Mailbox) -> Self {
        let metrics = Metrics::init(&cfg.registry);
        Self {
            identity: Arc::new(cfg.identity),
            stream: cfg.stream,
            verifier: Verifier::new(cfg.trust, router.clone(), cfg.challenge_length),
            router,
            mailbox_size: cfg.mailbox_size,
            metrics,
        }
    }

    /// Accept connections until the listener fails, serving each on its own task.
    pub async fn run<L: Listener>(self, mut listener: L) {
        loop {
            let (address, sink, stream) = match listener.accept().await {
                Ok(connection) => connection,
                Err(err) => {
                    debug!(?err, "failed to accept connection");
                    continue;
                }
            };
            self.metrics.connections_accepted.inc();
            debug!(?address, "accepted connection");
            tokio::spawn(self.clone().serve(address, sink, stream));
        }
    }

    /// Serve a single connection until it closes.
    pub async fn serve<Si: Sink, St: Stream>(self, address: SocketAddr, sink: Si, stream: St) {
        // Establish the session key
        let connection =
            match handshake::listen(&mut OsRng, &self.stream, &self.identity, sink, stream).await {
                Ok(connection) => connection,
                Err(err) => {
                    self.metrics.handshakes_failed.inc();
                    debug!(?address, ?err, "handshake failed");
                    return;
                }
            };
        let (mut sender, mut receiver) = connection.split();

        // Authenticate the client
        let (relay, deliveries) = mpsc::channel(self.mailbox_size);
        let verification = timeout(
            self.stream.handshake_timeout,
            self.verifier
                .verify(&mut OsRng, &mut sender, &mut receiver, Relay::new(relay)),
        )
        .await;
        let claim = match verification {
            Ok(Ok(claim)) => claim,
            Ok(Err(err)) => {
                self.metrics.authentications_failed.inc();
                warn!(?address, ?err, "authentication failed");
                return;
            }
            Err(_) => {
                self.metrics.authentications_failed.inc();
                debug!(?address, "authentication timed out");
                return;
            }
        };
        info!(?address, client_id = %claim.client_id, "client connected");

        // Forward in both directions until either side stops
        let result = self.run_connection(&claim, sender, receiver, deliveries).await;
        self.router
            .deregister(claim.client_id.clone(), claim.session)
            .await;
        info!(?address, client_id = %claim.client_id, ?result, "client disconnected");
    }

    async fn run_connection<Si: Sink, St: Stream>(
        &self,
        claim: &Claim,
        mut sender: Sender<Si>,
        mut receiver: Receiver<St>,
        mut deliveries: mpsc::Receiver<Delivery>,
    ) -> Result<(), ChannelError> {
        let mut send_handler: JoinHandle<Result<(), ChannelError>> = tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                sender.send(&wire::encode(&delivery)).await?;
            }
            Ok(())
        });
        let mut receive_handler: JoinHandle<Result<(), ChannelError>> = tokio::spawn({
            let client_id = claim.client_id.clone();
            let router = self.router.clone();
            async move {
                loop {
                    let msg = receiver.recv().await?;
                    let request: Request = match wire::decode(&msg) {
                        Ok(request) => request,
                        Err(err) => {
                            debug!(%client_id, %err, "skipping malformed request");
                            continue;
                        }
                    };
                    let target = request.target.clone();
                    let result = router
                        .route(client_id.clone(), request.target, request.text)
                        .await;
                    if result != RouteResult::Delivered {
                        debug!(%client_id, %target, ?result, "message not delivered");
                    }
                }
            }
        });

        // Wait for one of the handlers to finish
        let result = select! {
            send_result = &mut send_handler => {
                receive_handler.abort();
                send_result
            },
            receive_result = &mut receive_handler => {
                send_handler.abort();
                receive_result
            },
        };
        match result {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Transport(shield_stream::Error::Closed)),
        }
    }
}
