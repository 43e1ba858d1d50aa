use super::RegistryError;
use crate::wire::Delivery;
use tokio::sync::{mpsc, oneshot};

/// Outcome of routing a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteResult {
    /// Handed to the target's connection.
    Delivered,
    /// No live connection is registered for the target.
    TargetOffline,
    /// The target is online but its outbound queue is full.
    Dropped,
}

pub enum Message {
    Register {
        client_id: String,
        relay: Relay,
        response: oneshot::Sender<Result<u64, RegistryError>>,
    },
    Deregister {
        client_id: String,
        session: u64,
    },
    Route {
        sender: String,
        target: String,
        text: String,
        response: oneshot::Sender<RouteResult>,
    },
    Online {
        client_id: String,
        response: oneshot::Sender<bool>,
    },
}

#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    /// Register `relay` as the live connection of `client_id`.
    ///
    /// Returns the session number that must be presented to [Mailbox::deregister].
    pub async fn register(&self, client_id: String, relay: Relay) -> Result<u64, RegistryError> {
        let (response, receiver) = oneshot::channel();
        self.sender
            .send(Message::Register {
                client_id,
                relay,
                response,
            })
            .await
            .map_err(|_| RegistryError::Closed)?;
        receiver.await.map_err(|_| RegistryError::Closed)?
    }

    /// Remove the registration of `client_id` made under `session`, if it is still current.
    pub async fn deregister(&self, client_id: String, session: u64) {
        let _ = self
            .sender
            .send(Message::Deregister { client_id, session })
            .await;
    }

    /// Forward `text` from `sender` to the live connection of `target`.
    pub async fn route(&self, sender: String, target: String, text: String) -> RouteResult {
        let (response, receiver) = oneshot::channel();
        if self
            .sender
            .send(Message::Route {
                sender,
                target,
                text,
                response,
            })
            .await
            .is_err()
        {
            return RouteResult::TargetOffline;
        }
        receiver.await.unwrap_or(RouteResult::TargetOffline)
    }

    /// Returns whether `client_id` has a live connection.
    pub async fn online(&self, client_id: String) -> bool {
        let (response, receiver) = oneshot::channel();
        if self
            .sender
            .send(Message::Online {
                client_id,
                response,
            })
            .await
            .is_err()
        {
            return false;
        }
        receiver.await.unwrap_or(false)
    }
}

/// Hands deliveries to the task that owns a connection.
///
/// The owning task seals each [Delivery] under its own session key before sending it.
#[derive(Clone, Debug)]
pub struct Relay {
    sender: mpsc::Sender<Delivery>,
}

impl Relay {
    pub fn new(sender: mpsc::Sender<Delivery>) -> Self {
        Self { sender }
    }

    /// Queue `delivery` without waiting.
    ///
    /// We return a Result here instead of blocking because a slow or departing recipient must
    /// never stall the router.
    pub fn deliver(&self, delivery: Delivery) -> Result<(), mpsc::error::TrySendError<Delivery>> {
        self.sender.try_send(delivery)
    }
}
