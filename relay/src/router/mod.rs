//! Registry of authenticated connections and the routing between them.
//!
//! A single [Actor] owns the identifier to connection mapping. Connection tasks reach it
//! through a cloneable [Mailbox], so every registration, removal and lookup is applied in the
//! order it was received.

use prometheus_client::registry::Registry;
use std::sync::{Arc, Mutex};
use thiserror::Error;

mod actor;
mod ingress;

pub use actor::Actor;
pub use ingress::{Mailbox, Message, Relay, RouteResult};

/// Configuration for the router [Actor].
pub struct Config {
    /// Registry that router metrics are registered in.
    pub registry: Arc<Mutex<Registry>>,

    /// Size of the router mailbox.
    pub mailbox_size: usize,
}

/// Errors that can occur when registering a connection.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("identifier already registered: {0}")]
    DuplicateIdentifier(String),
    #[error("router closed")]
    Closed,
}
