use super::{
    ingress::{Mailbox, Message, Relay, RouteResult},
    Config, RegistryError,
};
use crate::wire::Delivery;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use std::collections::{hash_map::Entry, HashMap};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

pub struct Actor {
    control: mpsc::Receiver<Message>,
    connections: HashMap<String, (u64, Relay)>,
    next_session: u64,

    messages_routed: Counter,
    messages_dropped: Counter,
    connections_online: Gauge,
}

impl Actor {
    pub fn new(cfg: Config) -> (Self, Mailbox) {
        let (control_sender, control_receiver) = mpsc::channel(cfg.mailbox_size);

        // Create metrics
        let messages_routed = Counter::default();
        let messages_dropped = Counter::default();
        let connections_online = Gauge::default();
        {
            let mut registry = cfg.registry.lock().unwrap();
            registry.register(
                "messages_routed",
                "messages handed to a recipient connection",
                messages_routed.clone(),
            );
            registry.register(
                "messages_dropped",
                "messages dropped because the recipient was offline or congested",
                messages_dropped.clone(),
            );
            registry.register(
                "connections",
                "authenticated connections",
                connections_online.clone(),
            );
        }

        (
            Self {
                control: control_receiver,
                connections: HashMap::new(),
                next_session: 0,
                messages_routed,
                messages_dropped,
                connections_online,
            },
            Mailbox::new(control_sender),
        )
    }

    fn route(&self, sender: String, target: String, text: String) -> RouteResult {
        let Some((_, relay)) = self.connections.get(&target) else {
            debug!(%sender, %target, "target offline");
            self.messages_dropped.inc();
            return RouteResult::TargetOffline;
        };
        match relay.deliver(Delivery { text, sender }) {
            Ok(()) => {
                self.messages_routed.inc();
                RouteResult::Delivered
            }
            Err(TrySendError::Full(delivery)) => {
                debug!(sender = %delivery.sender, %target, "recipient congested");
                self.messages_dropped.inc();
                RouteResult::Dropped
            }
            Err(TrySendError::Closed(delivery)) => {
                // The connection is tearing down and will deregister shortly
                debug!(sender = %delivery.sender, %target, "recipient closing");
                self.messages_dropped.inc();
                RouteResult::TargetOffline
            }
        }
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.control.recv().await {
            match msg {
                Message::Register {
                    client_id,
                    relay,
                    response,
                } => {
                    let result = match self.connections.entry(client_id.clone()) {
                        Entry::Occupied(_) => {
                            debug!(%client_id, "identifier already registered");
                            Err(RegistryError::DuplicateIdentifier(client_id.clone()))
                        }
                        Entry::Vacant(entry) => {
                            let session = self.next_session;
                            self.next_session += 1;
                            debug!(%client_id, session, "connection registered");
                            entry.insert((session, relay));
                            self.connections_online.inc();
                            Ok(session)
                        }
                    };

                    // A registration nobody is waiting for would never be deregistered
                    if let Err(Ok(session)) = response.send(result) {
                        self.connections.remove(&client_id);
                        self.connections_online.dec();
                        debug!(%client_id, session, "registration abandoned");
                    }
                }
                Message::Deregister { client_id, session } => {
                    // Only the registration made under this session may be removed
                    let current = self
                        .connections
                        .get(&client_id)
                        .is_some_and(|(registered, _)| *registered == session);
                    if current {
                        self.connections.remove(&client_id);
                        self.connections_online.dec();
                        debug!(%client_id, session, "connection deregistered");
                    }
                }
                Message::Route {
                    sender,
                    target,
                    text,
                    response,
                } => {
                    let result = self.route(sender, target, text);
                    let _ = response.send(result);
                }
                Message::Online {
                    client_id,
                    response,
                } => {
                    let _ = response.send(self.connections.contains_key(&client_id));
                }
            }
        }
        debug!("router shutdown");
    }
}
