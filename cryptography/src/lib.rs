//! Generate identity keys, sign arbitrary messages, and agree on ephemeral secrets.
//!
//! Every party (the relay and each of its clients) owns exactly one long-lived [ed25519] identity.
//! Its public half is the party's durable identity and is exchanged out-of-band (the relay's key)
//! or pinned on first contact (a client's key). Key agreement for a single session uses a fresh
//! [x25519] ephemeral secret that is consumed by the agreement itself.
//!
//! # Example
//! ```rust
//! use shield_cryptography::PrivateKey;
//! use rand::rngs::OsRng;
//!
//! // Generate a new identity
//! let signer = PrivateKey::from_rng(&mut OsRng);
//!
//! // Sign a message under a namespace
//! let namespace = b"demo";
//! let signature = signer.sign(namespace, b"hello, world!");
//!
//! // Verify the signature
//! assert!(signer.public_key().verify(namespace, b"hello, world!", &signature));
//! ```

use thiserror::Error;

pub mod ed25519;
pub use ed25519::{PrivateKey, PublicKey, Signature};
pub mod keys;
pub mod pem;
pub mod x25519;

/// Errors that can occur when interacting with cryptographic primitives.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid private key length")]
    InvalidPrivateKeyLength,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid public key length")]
    InvalidPublicKeyLength,
    #[error("invalid signature length")]
    InvalidSignatureLength,
    #[error("invalid ephemeral public key")]
    InvalidEphemeralPublicKey,
    #[error("invalid pem: {0}")]
    InvalidPem(&'static str),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
