//! Exchange encrypted messages with an authenticated peer over arbitrary transport.
//!
//! This crate secures a raw, frame-oriented transport (see [transport]) that offers no encryption
//! or authentication of its own. It is used by a relay (the **listener**) and its clients (the
//! **dialers**), where every dialer already knows the listener's identity key out-of-band.
//!
//! # Design
//!
//! ## Handshake
//!
//! A two-message handshake establishes a per-connection session key:
//!
//! - The listener sends a [handshake::Hello] containing a fresh X25519 ephemeral public key and a
//!   signature over it made with the listener's long-lived Ed25519 identity.
//! - The dialer verifies the signature against the listener's known identity, then answers with a
//!   [handshake::Reply] containing its own (unsigned) ephemeral public key.
//!
//! Both sides then compute the X25519 shared secret and derive the session key with HKDF-SHA256
//! (see [cipher]). Only the listener is authenticated here: dialers prove their identity
//! afterwards, over the encrypted channel, so that a listener can first decide whether (and how)
//! to trust a previously unknown key.
//!
//! ## Encryption
//!
//! All post-handshake traffic is wrapped in an [channel::Envelope] sealed with ChaCha20-Poly1305.
//! Each envelope carries a fresh random 96-bit nonce rather than a counter. This keeps each side
//! stateless with respect to the other's sequence at the cost of a negligible collision
//! probability. Receivers remember recently seen nonces (see [replay]) and silently drop envelopes
//! whose nonce they have already processed.
//!
//! # Security
//!
//! ## Provided
//!
//! - **Listener Authentication**: The dialer only completes the handshake with the holder of the
//!   expected identity key.
//! - **Confidentiality and Integrity**: Tampering with a nonce, ciphertext or tag is detected and
//!   terminates the connection.
//! - **Replay Rejection**: A captured envelope cannot be processed twice on the same connection.
//! - **Handshake Timeout**: A configurable deadline is enforced for handshake completion.
//!
//! ## Not Provided
//!
//! - **Dialer Authentication**: Left to the application (performed over the established channel).
//! - **Forward Secrecy beyond the session**: Only the per-session ephemeral keys protect traffic.
//! - **Padding**: Messages are encrypted as-is, allowing an attacker to perform traffic analysis.

use std::{num::NonZeroUsize, time::Duration};

pub mod channel;
pub use channel::{ChannelError, Connection, Envelope, Receiver, Sender};
pub mod cipher;
pub mod handshake;
pub use handshake::{connect, listen, HandshakeError};
pub mod mocks;
pub mod replay;
pub mod tcp;
pub mod transport;
pub mod utils;
mod wire;

/// Errors that can occur when interacting with a transport.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("connection closed")]
    Closed,
    #[error("operation timed out")]
    Timeout,
    #[error("bind failed")]
    BindFailed,
    #[error("dial failed")]
    DialFailed,
    #[error("send failed")]
    SendFailed,
    #[error("recv failed")]
    RecvFailed,
    #[error("send zero size")]
    SendZeroSize,
    #[error("send too large: {0} bytes")]
    SendTooLarge(usize),
    #[error("recv too large: {0} bytes")]
    RecvTooLarge(usize),
}

/// Configuration for a connection.
///
/// # Warning
///
/// Synchronize this configuration across all peers.
/// Mismatched configurations may cause dropped connections or parsing errors.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum frame size (in bytes). Prevents memory exhaustion DoS attacks.
    pub max_message_size: usize,

    /// Maximum time allowed for completing the handshake.
    pub handshake_timeout: Duration,

    /// Number of inbound nonces remembered per connection to reject replays.
    pub nonce_history: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            handshake_timeout: Duration::from_secs(10),
            nonce_history: NonZeroUsize::new(replay::DEFAULT_CAPACITY).unwrap(),
        }
    }
}
